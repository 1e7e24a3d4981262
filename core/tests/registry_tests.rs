// tests/registry_tests.rs
mod common;

use common::*;
use mercado_flow::{Flow, FlowData, FlowError, FlowOutcome, FlowRegistry, StepControl, StepDef};

#[derive(Debug, Default)]
struct AlphaCtx {
  value: String,
}

#[derive(Debug, Default)]
struct BetaCtx {
  number: i32,
}

#[tokio::test]
async fn registry_dispatches_by_context_type() {
  setup_tracing();
  let registry = FlowRegistry::<TestError>::new();

  let mut alpha = Flow::<AlphaCtx, TestError>::new(&[StepDef::required("work")]);
  alpha.on_step("work", |data: FlowData<AlphaCtx>| {
    Box::pin(async move {
      data.write().value = "alpha".to_string();
      Ok::<_, TestError>(StepControl::Continue)
    })
  });
  registry.register(alpha);

  let mut beta = Flow::<BetaCtx, TestError>::new(&[StepDef::required("work")]);
  beta.on_step("work", |data: FlowData<BetaCtx>| {
    Box::pin(async move {
      data.write().number = 42;
      Ok::<_, TestError>(StepControl::Continue)
    })
  });
  registry.register(beta);

  assert!(registry.is_registered::<AlphaCtx>());
  assert!(registry.is_registered::<BetaCtx>());
  assert!(!registry.is_registered::<TestContext>());

  let alpha_data = FlowData::new(AlphaCtx::default());
  let beta_data = FlowData::new(BetaCtx::default());
  assert_eq!(registry.run(alpha_data.clone()).await.unwrap(), FlowOutcome::Completed);
  assert_eq!(registry.run(beta_data.clone()).await.unwrap(), FlowOutcome::Completed);

  assert_eq!(alpha_data.read().value, "alpha");
  assert_eq!(beta_data.read().number, 42);
}

#[tokio::test]
async fn unknown_context_type_is_reported() {
  setup_tracing();
  let registry = FlowRegistry::<TestError>::new();

  let err = registry.run(FlowData::new(AlphaCtx::default())).await.unwrap_err();
  match err {
    TestError::Engine(FlowError::UnknownFlow { context_type }) => assert!(context_type.contains("AlphaCtx")),
    other => panic!("unexpected error: {other:?}"),
  }
}

#[tokio::test]
async fn registering_again_replaces_the_flow() {
  setup_tracing();
  let registry = FlowRegistry::<TestError>::new();

  let mut first = Flow::<TestContext, TestError>::new(&[StepDef::required("work")]);
  first.on_step("work", recording("first"));
  registry.register(first);

  let mut second = Flow::<TestContext, TestError>::new(&[StepDef::required("work")]);
  second.on_step("work", recording("second"));
  registry.register(second);

  let data = FlowData::new(TestContext::default());
  registry.run(data.clone()).await.unwrap();
  assert_eq!(data.read().trail, vec!["second"]);
}

#[tokio::test]
async fn handler_errors_surface_through_the_registry() {
  setup_tracing();
  let registry = FlowRegistry::<TestError>::new();
  let mut flow = Flow::<TestContext, TestError>::new(&[StepDef::required("work")]);
  flow.on_step("work", failing("work"));
  registry.register(flow);

  let err = registry.run(FlowData::new(TestContext::default())).await.unwrap_err();
  assert!(matches!(err, TestError::Handler(_)));
}
