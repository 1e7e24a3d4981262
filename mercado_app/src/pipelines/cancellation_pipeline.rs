// mercado_app/src/pipelines/cancellation_pipeline.rs

use crate::db::{self, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, DeliveryStatus, Order, OrderStatus, Severity};
use crate::pipelines::common_steps::{self, loaded, require_buyer, required_text};
use crate::pipelines::contexts::CancelOrderCtxData;
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument};
use uuid::Uuid;

const MAX_REASON_CHARS: usize = 500;

pub fn register_cancel_order_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<CancelOrderCtxData, AppError>::new(&[
    StepDef::required("validate_reason"),
    StepDef::required("load_order"),
    StepDef::required("authorize_buyer"),
    StepDef::required("cancel_before_dispatch"),
    StepDef::side_effect("notify_seller"),
  ]);

  p.on_step("validate_reason", |data: FlowData<CancelOrderCtxData>| {
    Box::pin(async move {
      let mut guard = data.write();
      let reason = required_text("Cancellation reason", &guard.reason, MAX_REASON_CHARS)?;
      guard.reason = reason;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("load_order", |data: FlowData<CancelOrderCtxData>| {
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

  p.on_step("authorize_buyer", |data: FlowData<CancelOrderCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      require_buyer(&loaded(&guard.order)?, &guard.actor)?;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("cancel_before_dispatch", cancel_before_dispatch);
  p.on_step("notify_seller", common_steps::deliver_notifications::<CancelOrderCtxData>);

  registry.register(p);
}

/// Maps the state that blocked a cancellation to the error the buyer sees.
fn cancellation_refusal(order: &Order) -> AppError {
  if order.status == OrderStatus::Cancelled
    || order.status == OrderStatus::Fulfilled
    || order.delivery_status == DeliveryStatus::Delivered
  {
    AppError::AlreadyFinal
  } else if order.delivery_status == DeliveryStatus::OnWay {
    AppError::TooLate
  } else if order.status == OrderStatus::Disputed {
    AppError::Conflict("Orders under dispute cannot be cancelled; use the claim instead".to_string())
  } else {
    AppError::Conflict("The order can no longer be cancelled".to_string())
  }
}

#[instrument(name = "cancellation::cancel", skip(data), err)]
async fn cancel_before_dispatch(data: FlowData<CancelOrderCtxData>) -> Result<StepControl> {
  let (pool, config, order, reason) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
      guard.reason.clone(),
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET status = 'CANCELLED', cancellation_reason = ?1, updated_at = ?2 \
     WHERE id = ?3 AND status IN ('PENDING', 'PAID') AND delivery_status IN ('PENDING', 'ASSIGNED')",
  )
  .bind(&reason)
  .bind(Utc::now())
  .bind(order.id)
  .execute(&mut *tx)
  .await?;

  if result.rows_affected() == 0 {
    let current = orders::fetch_order(&mut *tx, order.id).await?;
    return Err(cancellation_refusal(&current));
  }

  order_thread::append_system_message(&mut *tx, order.id, &format!("Order cancelled by the buyer. Reason: {}", reason))
    .await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, "Order cancelled by buyer.");

  let mut guard = data.write();
  guard.order = Some(updated);
  guard.outbox.push(
    NewNotification::new(
      order.seller_id,
      "Order cancelled",
      format!("The buyer cancelled the order: {}", reason),
      Severity::Warning,
    )
    .with_link(config.order_link(order.id)),
  );
  Ok(StepControl::Continue)
}

/// Buyer cancellation. Allowed until the courier is on the way.
///
/// Stock is not returned here; the seller does that explicitly.
#[instrument(name = "cancellation::run", skip(state, reason), fields(actor_id = %actor.id))]
pub async fn run_cancel_order(state: &AppState, actor: Actor, order_id: Uuid, reason: &str) -> Result<Order> {
  let data = FlowData::new(CancelOrderCtxData::new(state.clone(), actor, order_id, reason.to_string()));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "cancel order")?;
  let order = loaded(&data.read().order)?;
  Ok(order)
}
