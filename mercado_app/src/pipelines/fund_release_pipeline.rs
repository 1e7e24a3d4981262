// mercado_app/src/pipelines/fund_release_pipeline.rs

//! Releases courier-delivered funds once the holding window has passed.
//! Orders with an open claim, and cancelled orders, are never touched.

use crate::db;
use crate::errors::{AppError, Result};
use crate::models::Severity;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::FundSweepCtxData;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use mercado_flow::{Flow, FlowData, FlowOutcome, FlowRegistry, StepControl, StepDef};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

pub fn register_fund_sweep_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<FundSweepCtxData, AppError>::new(&[
    StepDef::required("select_due_orders"),
    StepDef::required("release_due_funds"),
    StepDef::side_effect("notify_sellers"),
  ]);

  p.on_step("select_due_orders", select_due_orders);
  p.on_step("release_due_funds", release_due_funds);
  p.on_step("notify_sellers", common_steps::deliver_notifications::<FundSweepCtxData>);

  registry.register(p);
}

async fn select_due_orders(data: FlowData<FundSweepCtxData>) -> Result<StepControl> {
  let (pool, now) = {
    let guard = data.read();
    (guard.app_state.db_pool.clone(), guard.now)
  };

  let candidates = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>)>(
    "SELECT o.id, o.seller_id, o.funds_release_at FROM orders o \
     WHERE o.delivery_method = 'DELIVERY' AND o.delivery_status = 'DELIVERED' AND o.status <> 'CANCELLED' \
       AND o.funds_released = 0 AND o.funds_release_at IS NOT NULL \
       AND NOT EXISTS (SELECT 1 FROM claims c WHERE c.order_id = o.id AND c.status = 'OPEN')",
  )
  .fetch_all(&pool)
  .await?;

  // Timestamps are compared as decoded values, not as stored text.
  let due: Vec<(Uuid, Uuid)> = candidates
    .into_iter()
    .filter(|(_, _, release_at)| *release_at <= now)
    .map(|(order_id, seller_id, _)| (order_id, seller_id))
    .collect();

  if due.is_empty() {
    debug!("No funds due for release.");
    return Ok(StepControl::Halt);
  }
  data.write().due = due;
  Ok(StepControl::Continue)
}

#[instrument(name = "fund_release::release", skip(data), err)]
async fn release_due_funds(data: FlowData<FundSweepCtxData>) -> Result<StepControl> {
  let (pool, config, now, due) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      guard.now,
      guard.due.clone(),
    )
  };

  let mut released = Vec::new();
  let mut outbox = Vec::new();
  for (order_id, seller_id) in due {
    let mut tx = db::begin_write(&pool).await?;
    let result = sqlx::query(
      "UPDATE orders SET funds_released = 1, updated_at = ?1 \
       WHERE id = ?2 AND funds_released = 0 AND status <> 'CANCELLED' \
         AND NOT EXISTS (SELECT 1 FROM claims c WHERE c.order_id = orders.id AND c.status = 'OPEN')",
    )
    .bind(now)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    // Raced with a receipt confirmation or a new claim; nothing to do.
    if result.rows_affected() == 0 {
      continue;
    }
    order_thread::append_system_message(&mut *tx, order_id, "Holding window ended. Funds released to the seller.").await?;
    tx.commit().await?;

    released.push(order_id);
    outbox.push(
      NewNotification::new(
        seller_id,
        "Funds released",
        "The holding window ended and your funds are available.",
        Severity::Success,
      )
      .with_link(config.order_link(order_id)),
    );
  }

  info!(released = released.len(), "Fund release sweep finished.");
  let mut guard = data.write();
  guard.released = released;
  guard.outbox.extend(outbox);
  Ok(StepControl::Continue)
}

/// One sweep as of `now`. Returns the orders whose funds were released.
pub async fn run_release_due_funds(state: &AppState, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
  let data = FlowData::new(FundSweepCtxData::new(state.clone(), now));
  match state.flows.run(data.clone()).await? {
    FlowOutcome::Completed => Ok(data.read().released.clone()),
    FlowOutcome::Halted { .. } => Ok(Vec::new()),
  }
}

/// Runs the sweep every `interval` until the runtime shuts down.
pub fn spawn_fund_release_sweeper(state: AppState, interval: Duration) -> JoinHandle<()> {
  info!(interval_secs = interval.as_secs(), "Starting fund release sweeper.");
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    loop {
      ticker.tick().await;
      if let Err(e) = run_release_due_funds(&state, Utc::now()).await {
        error!(error = %e, "Fund release sweep failed.");
      }
    }
  })
}
