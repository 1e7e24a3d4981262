// src/flow/mod.rs

//! `Flow<T, E>`: construction, handler registration and execution.

pub mod definition;
pub mod execution;

pub use definition::Flow;
