// tests/common/mod.rs
#![allow(dead_code)]

use mercado_flow::{FlowData, FlowError, StepControl};
use once_cell::sync::Lazy;
use std::future::Future;
use std::pin::Pin;
use tracing::Level;

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub trail: Vec<String>,
  pub halt_at: Option<String>,
  pub skip_audit: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TestError {
  #[error("engine: {0}")]
  Engine(#[from] FlowError),

  #[error("handler failed: {0}")]
  Handler(String),
}

pub type BoxedStep = Pin<Box<dyn Future<Output = Result<StepControl, TestError>> + Send>>;

/// Records `label` in the trail and bumps the counter; halts when
/// `halt_at` names the label.
pub fn recording(label: &'static str) -> impl Fn(FlowData<TestContext>) -> BoxedStep + Send + Sync + 'static {
  move |data: FlowData<TestContext>| {
    Box::pin(async move {
      let mut guard = data.write();
      guard.counter += 1;
      guard.trail.push(label.to_string());
      tracing::debug!(target: "flow_tests", step = label, counter = guard.counter, "handler ran");
      if guard.halt_at.as_deref() == Some(label) {
        return Ok(StepControl::Halt);
      }
      Ok(StepControl::Continue)
    })
  }
}

pub fn failing(label: &'static str) -> impl Fn(FlowData<TestContext>) -> BoxedStep + Send + Sync + 'static {
  move |data: FlowData<TestContext>| {
    Box::pin(async move {
      data.write().trail.push(label.to_string());
      Err(TestError::Handler(format!("{label} broke")))
    })
  }
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
