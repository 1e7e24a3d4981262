// mercado_app/src/pipelines/claim_resolution_pipeline.rs

//! Claim endings other than a refund: an administrator closing it in the
//! seller's favor, or the buyer withdrawing it. Neither touches the order's
//! status or funds; once no claim is open the fund sweep resumes.

use crate::db::{self, claims, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, Claim, ClaimStatus, Severity};
use crate::pipelines::common_steps::{self, loaded};
use crate::pipelines::contexts::{AdminCloseClaimCtxData, WithdrawClaimCtxData};
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument};
use uuid::Uuid;

// --- Administrative close ---

pub fn register_admin_close_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<AdminCloseClaimCtxData, AppError>::new(&[
    StepDef::required("authorize_admin"),
    StepDef::required("load_order"),
    StepDef::required("close_open_claim"),
    StepDef::side_effect("notify_parties"),
  ]);

  p.on_step("authorize_admin", |data: FlowData<AdminCloseClaimCtxData>| {
    Box::pin(async move {
      if !data.read().actor.is_admin() {
        return Err(AppError::Forbidden("Only administrators can close claims".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("load_order", |data: FlowData<AdminCloseClaimCtxData>| {
    Box::pin(async move {
      let (pool, order_id) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.order_id)
      };
      let order = orders::fetch_order(&pool, order_id).await?;
      data.write().order = Some(order);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("close_open_claim", close_open_claim);
  p.on_step("notify_parties", common_steps::deliver_notifications::<AdminCloseClaimCtxData>);

  registry.register(p);
}

#[instrument(name = "claims::admin_close", skip(data), err)]
async fn close_open_claim(data: FlowData<AdminCloseClaimCtxData>) -> Result<StepControl> {
  let (pool, config, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let closed = claims::resolve_open(&mut *tx, order.id, ClaimStatus::ResolvedReleased).await?;
  if closed == 0 {
    return Err(AppError::NotFound("There is no open claim on this order".to_string()));
  }
  order_thread::append_system_message(&mut *tx, order.id, "An administrator closed the claim in favor of the seller.")
    .await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, "Claim closed by administrator.");

  let link = config.order_link(order.id);
  let mut guard = data.write();
  guard.order = Some(updated);
  guard.outbox.push(
    NewNotification::new(order.seller_id, "Claim closed", "The claim was resolved in your favor.", Severity::Success)
      .with_link(link.clone()),
  );
  if let Some(buyer) = order.user_id {
    guard.outbox.push(
      NewNotification::new(buyer, "Claim closed", "An administrator closed your claim.", Severity::Info)
        .with_link(link),
    );
  }
  Ok(StepControl::Continue)
}

#[instrument(name = "claims::admin_close::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_resolve_claim_admin_close(state: &AppState, actor: Actor, order_id: Uuid) -> Result<Claim> {
  let data = FlowData::new(AdminCloseClaimCtxData::new(state.clone(), actor, order_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "admin close claim")?;
  claims::find_claim(&state.db_pool, order_id)
    .await?
    .ok_or_else(|| AppError::Internal("Claim vanished after closing".to_string()))
}

// --- Buyer withdrawal ---

pub fn register_withdraw_claim_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<WithdrawClaimCtxData, AppError>::new(&[
    StepDef::required("load_open_claim"),
    StepDef::required("authorize_claimant"),
    StepDef::required("withdraw_claim"),
    StepDef::side_effect("notify_seller"),
  ]);

  p.on_step("load_open_claim", |data: FlowData<WithdrawClaimCtxData>| {
    Box::pin(async move {
      let (pool, order_id) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.order_id)
      };
      let order = orders::fetch_order(&pool, order_id).await?;
      let claim = claims::find_claim(&pool, order_id)
        .await?
        .filter(|c| c.status == ClaimStatus::Open)
        .ok_or_else(|| AppError::NotFound("There is no open claim on this order".to_string()))?;
      let mut guard = data.write();
      guard.order = Some(order);
      guard.claim = Some(claim);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("authorize_claimant", |data: FlowData<WithdrawClaimCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      let is_claimant = guard.claim.as_ref().map(|c| c.user_id == guard.actor.id).unwrap_or(false);
      if !is_claimant {
        return Err(AppError::Forbidden("Only the buyer who opened the claim can withdraw it".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("withdraw_claim", withdraw_claim);
  p.on_step("notify_seller", common_steps::deliver_notifications::<WithdrawClaimCtxData>);

  registry.register(p);
}

#[instrument(name = "claims::withdraw", skip(data), err)]
async fn withdraw_claim(data: FlowData<WithdrawClaimCtxData>) -> Result<StepControl> {
  let (pool, config, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let withdrawn = claims::resolve_open(&mut *tx, order.id, ClaimStatus::ResolvedReleased).await?;
  if withdrawn == 0 {
    return Err(AppError::NotFound("There is no open claim on this order".to_string()));
  }
  order_thread::append_system_message(&mut *tx, order.id, "The buyer withdrew the claim.").await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, "Claim withdrawn by buyer.");

  let mut guard = data.write();
  guard.order = Some(updated);
  guard.outbox.push(
    NewNotification::new(order.seller_id, "Claim withdrawn", "The buyer withdrew the claim.", Severity::Success)
      .with_link(config.order_link(order.id)),
  );
  Ok(StepControl::Continue)
}

#[instrument(name = "claims::withdraw::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_cancel_own_claim(state: &AppState, actor: Actor, order_id: Uuid) -> Result<Claim> {
  let data = FlowData::new(WithdrawClaimCtxData::new(state.clone(), actor, order_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "withdraw claim")?;
  claims::find_claim(&state.db_pool, order_id)
    .await?
    .ok_or_else(|| AppError::Internal("Claim vanished after withdrawal".to_string()))
}
