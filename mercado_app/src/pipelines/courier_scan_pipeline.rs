// mercado_app/src/pipelines/courier_scan_pipeline.rs

use crate::db::{self, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, DeliveryStatus, Order, OrderStatus, Severity};
use crate::pipelines::common_steps::{self, loaded};
use crate::pipelines::contexts::{CourierScanCtxData, ProofPhoto};
use crate::pipelines::expect_completed;
use crate::pipelines::pickup_scan_pipeline::delivery_refusal;
use crate::services::geo::{self, GeoPoint};
use crate::services::notifier::NewNotification;
use crate::services::{audit, order_thread};
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub fn register_courier_scan_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<CourierScanCtxData, AppError>::new(&[
    StepDef::required("authorize_courier"),
    StepDef::required("locate_delivery_order"),
    StepDef::required("verify_security_keywords"),
    StepDef::required("verify_delivery_proof"),
    StepDef::required("check_drop_off_distance"),
    StepDef::required("store_delivery_proof"),
    StepDef::required("mark_delivered_on_hold"),
    StepDef::side_effect("refresh_seller_reputation"),
    StepDef::side_effect("notify_parties"),
  ]);

  p.on_step("authorize_courier", |data: FlowData<CourierScanCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      if !guard.actor.is_logistics() {
        return Err(AppError::Forbidden("Only couriers can confirm a delivery".to_string()));
      }
      if let Some(location) = &guard.location {
        location.validate()?;
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("locate_delivery_order", locate_delivery_order);
  p.on_step("verify_security_keywords", verify_security_keywords);
  p.on_step("verify_delivery_proof", verify_delivery_proof);

  // Advisory only: a far-away scan is flagged for review, never refused.
  p.on_step("check_drop_off_distance", |data: FlowData<CourierScanCtxData>| {
    Box::pin(async move {
      let mut guard = data.write();
      let tolerance = guard.app_state.config.policy.geo_tolerance_meters;
      let order = loaded(&guard.order)?;
      let target = geo::point_from(order.shipping_lat, order.shipping_lng);
      if let (Some(target), Some(scan)) = (target, guard.location) {
        let distance = target.distance_meters(&scan);
        guard.distance_meters = Some(distance);
        guard.geo_flagged = distance > tolerance;
        if guard.geo_flagged {
          warn!(order_id = %order.id, distance_m = distance, tolerance_m = tolerance, "Delivery scanned far from the shipping address.");
        }
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("store_delivery_proof", store_delivery_proof);
  p.on_step("mark_delivered_on_hold", mark_delivered_on_hold);
  p.on_step(
    "refresh_seller_reputation",
    common_steps::refresh_seller_reputation::<CourierScanCtxData>,
  );
  p.on_step("notify_parties", common_steps::deliver_notifications::<CourierScanCtxData>);

  registry.register(p);
}

async fn locate_delivery_order(data: FlowData<CourierScanCtxData>) -> Result<StepControl> {
  let (pool, order_id) = {
    let guard = data.read();
    (guard.app_state.db_pool.clone(), guard.order_id)
  };

  let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1 AND delivery_method = 'DELIVERY'")
    .bind(order_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Delivery order {} not found", order_id)))?;
  let seller_ids = orders::seller_ids(&pool, order_id).await?;

  let mut guard = data.write();
  guard.order = Some(order);
  guard.seller_ids = seller_ids;
  Ok(StepControl::Continue)
}

/// Exact comparison, case and separators included.
pub(crate) fn keywords_match(expected: Option<&str>, claimed: &str) -> bool {
  matches!(expected, Some(expected) if expected == claimed)
}

async fn verify_security_keywords(data: FlowData<CourierScanCtxData>) -> Result<StepControl> {
  let (pool, actor, order, claimed) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.actor,
      loaded(&guard.order)?,
      guard.keywords.clone(),
    )
  };

  if !keywords_match(order.security_keywords.as_deref(), &claimed) {
    return Err(audit::reject_verification(&pool, order.id, &actor, AppError::KeywordMismatch).await);
  }
  Ok(StepControl::Continue)
}

async fn verify_delivery_proof(data: FlowData<CourierScanCtxData>) -> Result<StepControl> {
  let (pool, actor, order_id, has_proof) = {
    let guard = data.read();
    let has_proof = guard.proof.as_ref().map(|p| !p.bytes.is_empty()).unwrap_or(false);
    (guard.app_state.db_pool.clone(), guard.actor, guard.order_id, has_proof)
  };

  if !has_proof {
    return Err(audit::reject_verification(&pool, order_id, &actor, AppError::MissingProof).await);
  }
  Ok(StepControl::Continue)
}

async fn store_delivery_proof(data: FlowData<CourierScanCtxData>) -> Result<StepControl> {
  let (blob_store, order, proof) = {
    let guard = data.read();
    (
      guard.app_state.blob_store.clone(),
      loaded(&guard.order)?,
      guard.proof.clone(),
    )
  };

  // Cheap early refusal so a replayed scan does not leave an orphan photo.
  if order.delivery_status == DeliveryStatus::Delivered {
    return Err(AppError::AlreadyDelivered);
  }
  if order.status == OrderStatus::Cancelled {
    return Err(AppError::AlreadyFinal);
  }

  let proof = proof.ok_or(AppError::MissingProof)?;
  let reference = blob_store.store_image(&proof.bytes, &proof.content_type).await?;
  data.write().proof_ref = Some(reference);
  Ok(StepControl::Continue)
}

#[instrument(name = "courier_scan::mark_delivered", skip(data), err)]
async fn mark_delivered_on_hold(data: FlowData<CourierScanCtxData>) -> Result<StepControl> {
  let (pool, config, order, location, geo_flagged, proof_ref) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
      guard.location,
      guard.geo_flagged,
      guard.proof_ref.clone(),
    )
  };

  let now = Utc::now();
  let release_at = now + config.policy.courier_hold();

  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET \
       delivery_status = 'DELIVERED', \
       status = 'FULFILLED', \
       delivered_at = ?1, funds_release_at = ?2, proof_image = ?3, \
       scan_lat = ?4, scan_lng = ?5, geo_flagged = ?6, updated_at = ?1 \
     WHERE id = ?7 AND delivery_status <> 'DELIVERED' AND status <> 'CANCELLED' AND funds_released = 0",
  )
  .bind(now)
  .bind(release_at)
  .bind(&proof_ref)
  .bind(location.map(|l: GeoPoint| l.lat))
  .bind(location.map(|l: GeoPoint| l.lng))
  .bind(geo_flagged)
  .bind(order.id)
  .execute(&mut *tx)
  .await?;

  if result.rows_affected() == 0 {
    let current = orders::fetch_order(&mut *tx, order.id).await?;
    return Err(delivery_refusal(&current));
  }

  let mut note = format!(
    "Delivered by courier with photo proof. Funds will be released on {} unless a claim is opened.",
    release_at.format("%Y-%m-%d %H:%M UTC")
  );
  if geo_flagged {
    note.push_str(" The scan location was far from the shipping address and has been flagged for review.");
  }
  order_thread::append_system_message(&mut *tx, order.id, &note).await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, %release_at, geo_flagged, "Courier delivery recorded; funds on hold.");

  let link = config.order_link(order.id);
  let mut outbox = vec![NewNotification::new(
    order.seller_id,
    "Order delivered",
    format!(
      "The courier delivered the order. Funds become available on {}.",
      release_at.format("%Y-%m-%d %H:%M UTC")
    ),
    Severity::Success,
  )
  .with_link(link.clone())];
  if let Some(buyer) = order.user_id {
    outbox.push(
      NewNotification::new(
        buyer,
        "Your order has arrived",
        "Confirm receipt, or open a claim before the holding window ends.",
        Severity::Info,
      )
      .with_link(link),
    );
  }

  let mut guard = data.write();
  guard.funds_release_at = Some(release_at);
  guard.order = Some(updated);
  guard.outbox.extend(outbox);
  Ok(StepControl::Continue)
}

/// Courier drop-off: keywords plus photo. Funds stay on hold for the
/// configured window.
#[instrument(name = "courier_scan::run", skip(state, keywords, proof, location), fields(actor_id = %actor.id))]
pub async fn run_courier_scan(
  state: &AppState,
  actor: Actor,
  order_id: Uuid,
  keywords: &str,
  proof: Option<ProofPhoto>,
  location: Option<GeoPoint>,
) -> Result<Order> {
  let data = FlowData::new(CourierScanCtxData::new(
    state.clone(),
    actor,
    order_id,
    keywords.to_string(),
    proof,
    location,
  ));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "courier scan")?;
  let order = loaded(&data.read().order)?;
  Ok(order.redacted())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keyword_comparison_is_exact() {
    assert!(keywords_match(Some("LUNA-TREN-PATO"), "LUNA-TREN-PATO"));
    assert!(!keywords_match(Some("LUNA-TREN-PATO"), "luna-tren-pato"));
    assert!(!keywords_match(Some("LUNA-TREN-PATO"), "LUNA TREN PATO"));
    assert!(!keywords_match(None, ""));
  }
}
