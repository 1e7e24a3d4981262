// src/lib.rs

//! mercado-flow: a small async step-flow engine.
//!
//! Every order operation in the fulfillment core (checkout, pickup scan,
//! courier scan, claim actions...) is expressed as a `Flow` over a context
//! struct. A flow is an ordered list of named steps; each step has one or more
//! async handlers operating on a shared, lockable `FlowData<T>`.
//!
//!  - `Required` steps abort the flow when a handler fails.
//!  - `SideEffect` steps (notifications, emails) log and swallow failures, so a
//!    committed state change is never undone by a downstream hiccup.
//!  - Any handler may return `StepControl::Halt` to end the flow early.
//!  - `FlowRegistry` keys flows by context type and dispatches `run` calls.

pub mod core;
pub mod error;
pub mod flow;
pub mod registry;

pub use crate::core::control::{FlowOutcome, StepControl};
pub use crate::core::flow_data::FlowData;
pub use crate::core::handler::Handler;
pub use crate::core::step::{SkipCondition, StepDef, StepKind};
pub use crate::error::{FlowError, FlowResult};
pub use crate::flow::Flow;
pub use crate::registry::FlowRegistry;
