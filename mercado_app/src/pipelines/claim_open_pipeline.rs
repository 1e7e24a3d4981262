// mercado_app/src/pipelines/claim_open_pipeline.rs

use crate::db::{self, claims, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, Claim, ClaimType, Order, OrderStatus, Severity};
use crate::pipelines::common_steps::{self, loaded, require_buyer, required_text};
use crate::pipelines::contexts::OpenClaimCtxData;
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use uuid::Uuid;

pub(crate) const MAX_DESCRIPTION_CHARS: usize = 2_000;

pub fn register_open_claim_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<OpenClaimCtxData, AppError>::new(&[
    StepDef::required("validate_claim"),
    StepDef::required("load_order"),
    StepDef::required("authorize_buyer"),
    StepDef::required("open_claim"),
    StepDef::side_effect("notify_seller"),
  ]);

  p.on_step("validate_claim", |data: FlowData<OpenClaimCtxData>| {
    Box::pin(async move {
      let mut guard = data.write();
      let description = required_text("Claim description", &guard.description, MAX_DESCRIPTION_CHARS)?;
      guard.description = description;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("load_order", |data: FlowData<OpenClaimCtxData>| {
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

  p.on_step("authorize_buyer", |data: FlowData<OpenClaimCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      require_buyer(&loaded(&guard.order)?, &guard.actor)?;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("open_claim", open_claim);
  p.on_step("notify_seller", common_steps::deliver_notifications::<OpenClaimCtxData>);

  registry.register(p);
}

/// Opens (or reopens) the order's claim and marks the order `DISPUTED`, in
/// the caller's transaction. Shared with the mediation flow.
pub(crate) async fn open_claim_in_tx(
  conn: &mut SqliteConnection,
  order: &Order,
  claimant_id: Uuid,
  claim_type: ClaimType,
  description: &str,
) -> Result<Uuid> {
  let disputed = sqlx::query("UPDATE orders SET status = 'DISPUTED', updated_at = ?1 WHERE id = ?2 AND status <> 'CANCELLED'")
    .bind(Utc::now())
    .bind(order.id)
    .execute(&mut *conn)
    .await?;
  if disputed.rows_affected() == 0 {
    return Err(AppError::AlreadyFinal);
  }

  let claim_id = claims::open_or_reopen(&mut *conn, order.id, claimant_id, claim_type, description).await?;
  order_thread::append_system_message(
    &mut *conn,
    order.id,
    &format!("The buyer opened a claim ({}): {}", claim_type.as_str(), description),
  )
  .await?;
  Ok(claim_id)
}

#[instrument(name = "claims::open", skip(data), err)]
async fn open_claim(data: FlowData<OpenClaimCtxData>) -> Result<StepControl> {
  let (pool, config, order, actor, claim_type, description) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
      guard.actor,
      guard.claim_type,
      guard.description.clone(),
    )
  };

  if order.status == OrderStatus::Cancelled {
    return Err(AppError::AlreadyFinal);
  }

  let mut tx = db::begin_write(&pool).await?;
  let claim_id = open_claim_in_tx(&mut *tx, &order, actor.id, claim_type, &description).await?;
  tx.commit().await?;

  info!(order_id = %order.id, %claim_id, ?claim_type, "Claim opened; order disputed.");

  let mut guard = data.write();
  guard.claim_id = Some(claim_id);
  guard.outbox.push(
    NewNotification::new(
      order.seller_id,
      "Claim opened",
      "The buyer opened a claim. Funds are frozen until it is resolved.",
      Severity::Warning,
    )
    .with_link(config.order_link(order.id)),
  );
  Ok(StepControl::Continue)
}

/// Opens a claim on the buyer's order, freezing the funds.
#[instrument(name = "claims::open::run", skip(state, description), fields(actor_id = %actor.id))]
pub async fn run_open_claim(
  state: &AppState,
  actor: Actor,
  order_id: Uuid,
  claim_type: ClaimType,
  description: &str,
) -> Result<Claim> {
  let data = FlowData::new(OpenClaimCtxData::new(
    state.clone(),
    actor,
    order_id,
    claim_type,
    description.to_string(),
  ));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "open claim")?;

  claims::find_claim(&state.db_pool, order_id)
    .await?
    .ok_or_else(|| AppError::Internal("Claim vanished after opening".to_string()))
}
