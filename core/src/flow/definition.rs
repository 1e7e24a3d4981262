// src/flow/definition.rs

use crate::core::control::StepControl;
use crate::core::flow_data::FlowData;
use crate::core::handler::Handler;
use crate::core::step::StepDef;
use crate::error::FlowError;
use std::collections::HashMap;
use std::future::Future;

/// An ordered set of named steps over context type `T`, whose handlers fail
/// with `E`. `E` must absorb engine errors (`From<FlowError>`).
pub struct Flow<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<T>>,
  pub(crate) handlers: HashMap<String, Vec<Handler<T, E>>>,
}

impl<T, E> Flow<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new(steps: &[StepDef<T>]) -> Self {
    let mut seen = std::collections::HashSet::new();
    for step in steps {
      if !seen.insert(step.name.as_str()) {
        panic!("flow setup error: step '{}' declared twice", step.name);
      }
    }
    Self {
      steps: steps.to_vec(),
      handlers: HashMap::new(),
    }
  }

  fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!("flow setup error: step '{}' is not declared", step_name);
    }
  }

  /// Appends a handler to `step_name`. Handlers of one step run in the order
  /// they were registered.
  pub fn on_step<F, UserErr>(&mut self, step_name: &str, handler_fn: impl Fn(FlowData<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<StepControl, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let handler: Handler<T, E> = Box::new(move |data| {
      let fut = handler_fn(data);
      Box::pin(async move { fut.await.map_err(Into::into) })
    });
    self.handlers.entry(step_name.to_string()).or_default().push(handler);
  }

  /// Replaces the skip condition of an existing step.
  pub fn skip_step_if(&mut self, step_name: &str, cond: impl Fn(&T) -> bool + Send + Sync + 'static) {
    self.ensure_step_exists(step_name);
    if let Some(step) = self.steps.iter_mut().find(|s| s.name == step_name) {
      step.skip_if = Some(std::sync::Arc::new(cond));
    }
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }
}
