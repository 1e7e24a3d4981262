// src/core/control.rs

//! Flow control signals and the outcome of a complete run.

/// Returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  /// Run the next handler / step.
  Continue,
  /// End the flow now. Remaining handlers and steps are not executed.
  Halt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
  /// Every step ran (or was skipped by its condition).
  Completed,
  /// A handler returned `StepControl::Halt` in the named step.
  Halted { step: String },
}

impl FlowOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, FlowOutcome::Completed)
  }
}
