// src/flow/execution.rs

use crate::core::control::{FlowOutcome, StepControl};
use crate::core::flow_data::FlowData;
use crate::core::step::StepKind;
use crate::error::FlowError;
use crate::flow::definition::Flow;
use tracing::{event, instrument, Instrument, Level};

impl<T, E> Flow<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in order against `data`.
  ///
  /// Errors from `Required` steps are returned as-is; errors from
  /// `SideEffect` steps are logged and the flow continues with the next step.
  #[instrument(
    name = "Flow::run",
    skip_all,
    fields(context_type = %std::any::type_name::<T>(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, data: FlowData<T>) -> Result<FlowOutcome, E> {
    event!(Level::DEBUG, "Flow execution starting.");

    for (step_idx, step) in self.steps.iter().enumerate() {
      let span = tracing::info_span!("flow_step", step_name = %step.name, step_index = step_idx, kind = ?step.kind);

      if step.should_skip(&data) {
        event!(parent: &span, Level::DEBUG, "Step skipped by condition.");
        continue;
      }

      let handlers = match self.handlers.get(&step.name) {
        Some(h) if !h.is_empty() => h,
        _ => match step.kind {
          StepKind::SideEffect => {
            event!(parent: &span, Level::DEBUG, "Side-effect step has no handlers, skipping.");
            continue;
          }
          StepKind::Required => {
            event!(parent: &span, Level::ERROR, "Required step has no handlers.");
            return Err(E::from(FlowError::HandlerMissing {
              step_name: step.name.clone(),
            }));
          }
        },
      };

      for handler in handlers {
        match handler(data.clone()).instrument(span.clone()).await {
          Ok(StepControl::Continue) => {}
          Ok(StepControl::Halt) => {
            event!(parent: &span, Level::INFO, "Flow halted by handler.");
            return Ok(FlowOutcome::Halted {
              step: step.name.clone(),
            });
          }
          Err(e) => match step.kind {
            StepKind::Required => {
              event!(parent: &span, Level::WARN, error = %e, "Required step failed.");
              return Err(e);
            }
            StepKind::SideEffect => {
              event!(parent: &span, Level::WARN, error = %e, "Side-effect step failed; continuing.");
              break;
            }
          },
        }
      }
    }

    event!(Level::DEBUG, "Flow execution completed.");
    Ok(FlowOutcome::Completed)
  }
}
