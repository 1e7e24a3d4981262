// mercado_app/src/lib.rs

//! Fulfillment core of the Mercado marketplace: stock reservation, the order
//! lifecycle, delivery verification with escrowed funds, claims, and seller
//! reputation.

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod web;
