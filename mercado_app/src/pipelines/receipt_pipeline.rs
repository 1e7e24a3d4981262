// mercado_app/src/pipelines/receipt_pipeline.rs

use crate::db::{self, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, Order, OrderStatus, Severity};
use crate::pipelines::common_steps::{self, loaded, require_buyer};
use crate::pipelines::contexts::ConfirmReceiptCtxData;
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument};
use uuid::Uuid;

pub fn register_confirm_receipt_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<ConfirmReceiptCtxData, AppError>::new(&[
    StepDef::required("load_order"),
    StepDef::required("authorize_buyer"),
    StepDef::required("release_funds_on_receipt"),
    StepDef::side_effect("notify_seller"),
  ]);

  p.on_step("load_order", |data: FlowData<ConfirmReceiptCtxData>| {
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

  p.on_step("authorize_buyer", |data: FlowData<ConfirmReceiptCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      require_buyer(&loaded(&guard.order)?, &guard.actor)?;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("release_funds_on_receipt", release_funds_on_receipt);
  p.on_step("notify_seller", common_steps::deliver_notifications::<ConfirmReceiptCtxData>);

  registry.register(p);
}

#[instrument(name = "receipt::release_funds", skip(data), err)]
async fn release_funds_on_receipt(data: FlowData<ConfirmReceiptCtxData>) -> Result<StepControl> {
  let (pool, config, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
    )
  };

  let now = Utc::now();
  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET \
       delivery_status = 'DELIVERED', funds_released = 1, funds_release_at = ?1, \
       delivered_at = COALESCE(delivered_at, ?1), updated_at = ?1 \
     WHERE id = ?2 AND funds_released = 0 AND status <> 'CANCELLED'",
  )
  .bind(now)
  .bind(order.id)
  .execute(&mut *tx)
  .await?;

  if result.rows_affected() == 0 {
    let current = orders::fetch_order(&mut *tx, order.id).await?;
    return Err(if current.funds_released {
      AppError::AlreadyReleased
    } else if current.status == OrderStatus::Cancelled {
      AppError::AlreadyFinal
    } else {
      AppError::Conflict("The order changed while confirming receipt".to_string())
    });
  }

  order_thread::append_system_message(&mut *tx, order.id, "The buyer confirmed receipt. Funds released to the seller.")
    .await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, "Receipt confirmed by buyer, funds released.");

  let mut guard = data.write();
  guard.order = Some(updated);
  guard.outbox.push(
    NewNotification::new(
      order.seller_id,
      "Funds released",
      "The buyer confirmed receipt. Your funds are available.",
      Severity::Success,
    )
    .with_link(config.order_link(order.id)),
  );
  Ok(StepControl::Continue)
}

/// Buyer-side early release. Does not move the order to `FULFILLED`.
#[instrument(name = "receipt::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_confirm_receipt(state: &AppState, actor: Actor, order_id: Uuid) -> Result<Order> {
  let data = FlowData::new(ConfirmReceiptCtxData::new(state.clone(), actor, order_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "confirm receipt")?;
  let order = loaded(&data.read().order)?;
  Ok(order)
}
