// src/core/handler.rs

use crate::core::control::StepControl;
use crate::core::flow_data::FlowData;
use std::future::Future;
use std::pin::Pin;

/// Boxed async step handler. It receives a clone of the flow's `FlowData<T>`
/// and resolves to a control signal or the flow's error type.
pub type Handler<T, E> =
  Box<dyn Fn(FlowData<T>) -> Pin<Box<dyn Future<Output = Result<StepControl, E>> + Send>> + Send + Sync>;
