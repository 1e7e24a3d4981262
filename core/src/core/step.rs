// src/core/step.rs

use super::FlowData;
use std::sync::Arc;

/// Predicate evaluated right before a step; `true` skips the step.
pub type SkipCondition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync + 'static>;

/// How a step's failures affect the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
  /// A failing handler aborts the flow and the error is returned to the caller.
  Required,
  /// A failing handler is logged and the flow moves on. Used for
  /// notifications and other work that must not undo a committed change.
  SideEffect,
}

pub struct StepDef<T: 'static + Send + Sync> {
  pub name: String,
  pub kind: StepKind,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: 'static + Send + Sync> StepDef<T> {
  pub fn required(name: &str) -> Self {
    Self {
      name: name.to_string(),
      kind: StepKind::Required,
      skip_if: None,
    }
  }

  pub fn side_effect(name: &str) -> Self {
    Self {
      name: name.to_string(),
      kind: StepKind::SideEffect,
      skip_if: None,
    }
  }

  pub fn skip_if(mut self, cond: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
    self.skip_if = Some(Arc::new(cond));
    self
  }

  pub(crate) fn should_skip(&self, data: &FlowData<T>) -> bool {
    match &self.skip_if {
      Some(cond) => data.with(|d| cond(d)),
      None => false,
    }
  }
}

impl<T: 'static + Send + Sync> Clone for StepDef<T> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      kind: self.kind,
      skip_if: self.skip_if.clone(),
    }
  }
}

impl<T: 'static + Send + Sync> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}
