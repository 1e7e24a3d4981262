// mercado_app/src/pipelines/pickup_scan_pipeline.rs

use crate::db::{self, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, DeliveryStatus, Order, OrderStatus, Severity};
use crate::pipelines::common_steps::{self, loaded};
use crate::pipelines::contexts::PickupScanCtxData;
use crate::pipelines::expect_completed;
use crate::services::geo::GeoPoint;
use crate::services::notifier::NewNotification;
use crate::services::{order_thread, secrets};
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument};

pub fn register_pickup_scan_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<PickupScanCtxData, AppError>::new(&[
    StepDef::required("normalize_pickup_code"),
    StepDef::required("locate_pickup_order"),
    StepDef::required("authorize_handoff"),
    StepDef::required("mark_picked_up"),
    StepDef::side_effect("refresh_seller_reputation"),
    StepDef::side_effect("notify_parties"),
  ]);

  p.on_step("normalize_pickup_code", |data: FlowData<PickupScanCtxData>| {
    Box::pin(async move {
      let mut guard = data.write();
      let code = secrets::normalize_pickup_code(&guard.raw_code);
      if code.is_empty() {
        return Err(AppError::Validation("A pickup code is required".to_string()));
      }
      if let Some(location) = &guard.location {
        location.validate()?;
      }
      guard.code = code;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("locate_pickup_order", locate_pickup_order);

  p.on_step("authorize_handoff", |data: FlowData<PickupScanCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      let sells_here = guard.seller_ids.contains(&guard.actor.id);
      if !(sells_here || guard.actor.is_admin()) {
        return Err(AppError::Forbidden("You have no permission to deliver this order".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("mark_picked_up", mark_picked_up);
  p.on_step(
    "refresh_seller_reputation",
    common_steps::refresh_seller_reputation::<PickupScanCtxData>,
  );
  p.on_step("notify_parties", common_steps::deliver_notifications::<PickupScanCtxData>);

  registry.register(p);
}

async fn locate_pickup_order(data: FlowData<PickupScanCtxData>) -> Result<StepControl> {
  let (pool, code) = {
    let guard = data.read();
    (guard.app_state.db_pool.clone(), guard.code.clone())
  };

  let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE pickup_code = ?1 AND delivery_method = 'PICKUP'")
    .bind(&code)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Pickup code not found".to_string()))?;
  let seller_ids = orders::seller_ids(&pool, order.id).await?;

  let mut guard = data.write();
  guard.order = Some(order);
  guard.seller_ids = seller_ids;
  Ok(StepControl::Continue)
}

/// Why a guarded transition matched no row, read from the current state.
pub(crate) fn delivery_refusal(order: &Order) -> AppError {
  if order.delivery_status == DeliveryStatus::Delivered {
    AppError::AlreadyDelivered
  } else if order.status == OrderStatus::Cancelled {
    AppError::AlreadyFinal
  } else {
    AppError::Conflict("The order changed while it was being delivered".to_string())
  }
}

#[instrument(name = "pickup_scan::mark_picked_up", skip(data), err)]
async fn mark_picked_up(data: FlowData<PickupScanCtxData>) -> Result<StepControl> {
  let (pool, config, order, location) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
      guard.location,
    )
  };

  let now = Utc::now();
  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET \
       delivery_status = 'DELIVERED', \
       status = 'FULFILLED', \
       funds_released = 1, funds_release_at = ?1, delivered_at = ?1, \
       scan_lat = ?2, scan_lng = ?3, updated_at = ?1 \
     WHERE id = ?4 AND delivery_status <> 'DELIVERED' AND status <> 'CANCELLED'",
  )
  .bind(now)
  .bind(location.map(|l: GeoPoint| l.lat))
  .bind(location.map(|l: GeoPoint| l.lng))
  .bind(order.id)
  .execute(&mut *tx)
  .await?;

  if result.rows_affected() == 0 {
    let current = orders::fetch_order(&mut *tx, order.id).await?;
    return Err(delivery_refusal(&current));
  }

  order_thread::append_system_message(&mut *tx, order.id, "Order picked up at the counter. Funds released to the seller.")
    .await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, "Pickup handoff recorded, funds released.");

  let link = config.order_link(order.id);
  let mut outbox = vec![NewNotification::new(
    order.seller_id,
    "Order delivered",
    "The buyer picked up the order. Funds are available.",
    Severity::Success,
  )
  .with_link(link.clone())];
  if let Some(buyer) = order.user_id {
    outbox.push(
      NewNotification::new(buyer, "Order picked up", "Thanks for picking up your order!", Severity::Success)
        .with_link(link),
    );
  }

  let mut guard = data.write();
  guard.order = Some(updated);
  guard.outbox.extend(outbox);
  Ok(StepControl::Continue)
}

/// Redeems a pickup code at the counter. Completes the order and releases the
/// funds at once.
#[instrument(name = "pickup_scan::run", skip(state, code, location), fields(actor_id = %actor.id))]
pub async fn run_pickup_scan(state: &AppState, actor: Actor, code: &str, location: Option<GeoPoint>) -> Result<Order> {
  let data = FlowData::new(PickupScanCtxData::new(state.clone(), actor, code.to_string(), location));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "pickup scan")?;
  let order = loaded(&data.read().order)?;
  Ok(order.redacted())
}
