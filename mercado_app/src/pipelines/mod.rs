// mercado_app/src/pipelines/mod.rs

//! Every fulfillment operation is a flow: a context struct, an ordered list of
//! named steps, and a `run_*` entry point that builds the context and reads
//! the result back.

use crate::errors::{AppError, Result};
use mercado_flow::{FlowOutcome, FlowRegistry};

pub mod contexts;
pub mod common_steps;

pub mod checkout_pipeline;
pub mod pickup_scan_pipeline;
pub mod courier_scan_pipeline;
pub mod receipt_pipeline;
pub mod cancellation_pipeline;
pub mod dispatch_pipeline;
pub mod restock_pipeline;
pub mod claim_open_pipeline;
pub mod claim_refund_pipeline;
pub mod claim_resolution_pipeline;
pub mod mediation_pipeline;
pub mod review_pipeline;
pub mod fund_release_pipeline;

pub fn register_all_flows(registry: &FlowRegistry<AppError>) {
  tracing::info!("Registering fulfillment flows...");

  checkout_pipeline::register_checkout_flow(registry);
  pickup_scan_pipeline::register_pickup_scan_flow(registry);
  courier_scan_pipeline::register_courier_scan_flow(registry);
  receipt_pipeline::register_confirm_receipt_flow(registry);
  cancellation_pipeline::register_cancel_order_flow(registry);
  dispatch_pipeline::register_assign_courier_flow(registry);
  dispatch_pipeline::register_start_route_flow(registry);
  restock_pipeline::register_restock_flow(registry);
  claim_open_pipeline::register_open_claim_flow(registry);
  claim_refund_pipeline::register_refund_flow(registry);
  claim_resolution_pipeline::register_admin_close_flow(registry);
  claim_resolution_pipeline::register_withdraw_claim_flow(registry);
  mediation_pipeline::register_mediation_flow(registry);
  review_pipeline::register_review_flow(registry);
  fund_release_pipeline::register_fund_sweep_flow(registry);

  tracing::info!("All fulfillment flows registered.");
}

/// None of the request-driven flows halt on purpose; a halt there is a bug.
pub(crate) fn expect_completed(outcome: FlowOutcome, flow: &str) -> Result<()> {
  match outcome {
    FlowOutcome::Completed => Ok(()),
    FlowOutcome::Halted { step } => {
      tracing::error!(%flow, %step, "Flow halted unexpectedly.");
      Err(AppError::Internal(format!("{} flow halted at '{}'", flow, step)))
    }
  }
}
