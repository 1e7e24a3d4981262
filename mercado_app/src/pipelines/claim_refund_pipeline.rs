// mercado_app/src/pipelines/claim_refund_pipeline.rs

use crate::db::{self, claims, orders, users};
use crate::errors::{AppError, Result};
use crate::models::{Actor, ClaimStatus, Order, Severity};
use crate::pipelines::common_steps::{self, loaded, require_seller_or_admin};
use crate::pipelines::contexts::RefundCtxData;
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

pub fn register_refund_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<RefundCtxData, AppError>::new(&[
    StepDef::required("load_order"),
    StepDef::required("authorize_refund"),
    StepDef::required("process_refund"),
    // Guests have no account to mail.
    StepDef::side_effect("email_transcript")
      .skip_if(|ctx: &RefundCtxData| ctx.order.as_ref().and_then(|o| o.user_id).is_none()),
    StepDef::side_effect("notify_buyer"),
  ]);

  p.on_step("load_order", |data: FlowData<RefundCtxData>| {
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

  p.on_step("authorize_refund", |data: FlowData<RefundCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      require_seller_or_admin(&loaded(&guard.order)?, &guard.actor)?;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("process_refund", process_refund);
  p.on_step("email_transcript", email_transcript);
  p.on_step("notify_buyer", common_steps::deliver_notifications::<RefundCtxData>);

  registry.register(p);
}

#[instrument(name = "claims::refund", skip(data), err)]
async fn process_refund(data: FlowData<RefundCtxData>) -> Result<StepControl> {
  let (pool, config, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET status = 'CANCELLED', refund_status = 'COMPLETED', updated_at = ?1 \
     WHERE id = ?2 AND refund_status <> 'COMPLETED'",
  )
  .bind(Utc::now())
  .bind(order.id)
  .execute(&mut *tx)
  .await?;
  if result.rows_affected() == 0 {
    return Err(AppError::Conflict("This order was already refunded".to_string()));
  }

  let claims_resolved = claims::resolve_open(&mut *tx, order.id, ClaimStatus::ResolvedRefunded).await?;
  order_thread::append_system_message(&mut *tx, order.id, "Refund issued to the buyer. The order is cancelled.").await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, claims_resolved, "Refund processed.");

  let mut guard = data.write();
  guard.order = Some(updated);
  guard.claims_resolved = claims_resolved;
  if let Some(buyer) = order.user_id {
    guard.outbox.push(
      NewNotification::new(
        buyer,
        "Refund issued",
        "The seller refunded your order.",
        Severity::Success,
      )
      .with_link(config.order_link(order.id)),
    );
  }
  Ok(StepControl::Continue)
}

/// Mails the full thread to the buyer as a record of the dispute.
async fn email_transcript(data: FlowData<RefundCtxData>) -> Result<StepControl> {
  let (pool, notifier, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.notifier.clone(),
      loaded(&guard.order)?,
    )
  };
  let Some(buyer_id) = order.user_id else {
    return Ok(StepControl::Continue);
  };

  let buyer = users::find_user(&pool, buyer_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Buyer {} not found", buyer_id)))?;
  let messages = order_thread::list_messages(&pool, order.id).await?;
  let transcript = order_thread::render_transcript(order.id, &messages);

  notifier
    .send_email(&buyer.email, &format!("Refund for order {}", order.id), &transcript)
    .await?;
  data.write().transcript_sent = true;
  Ok(StepControl::Continue)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
  pub order: Order,
  pub claims_resolved: u64,
  pub transcript_sent: bool,
}

/// Refunds the buyer, cancels the order and resolves any open claim in the
/// buyer's favor.
#[instrument(name = "claims::refund::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_resolve_claim_refund(state: &AppState, actor: Actor, order_id: Uuid) -> Result<RefundResult> {
  let data = FlowData::new(RefundCtxData::new(state.clone(), actor, order_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "refund")?;

  let guard = data.read();
  Ok(RefundResult {
    order: loaded(&guard.order)?.redacted(),
    claims_resolved: guard.claims_resolved,
    transcript_sent: guard.transcript_sent,
  })
}
