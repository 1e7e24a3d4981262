// mercado_app/src/pipelines/mediation_pipeline.rs

use crate::db::{self, claims, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, Claim, ClaimStatus, ClaimType, Severity};
use crate::pipelines::claim_open_pipeline::{open_claim_in_tx, MAX_DESCRIPTION_CHARS};
use crate::pipelines::common_steps::{self, loaded, required_text};
use crate::pipelines::contexts::MediationCtxData;
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument};
use uuid::Uuid;

const DEFAULT_MEDIATION_NOTE: &str = "Mediation requested by the buyer.";

pub fn register_mediation_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<MediationCtxData, AppError>::new(&[
    StepDef::required("load_order"),
    StepDef::required("authorize_party"),
    StepDef::required("escalate_claim"),
    StepDef::side_effect("notify_counterpart"),
  ]);

  p.on_step("load_order", |data: FlowData<MediationCtxData>| {
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

  p.on_step("authorize_party", |data: FlowData<MediationCtxData>| {
    Box::pin(async move {
      let mut guard = data.write();
      let order = loaded(&guard.order)?;
      if !(order.is_buyer(guard.actor.id) || order.seller_id == guard.actor.id) {
        return Err(AppError::Forbidden("Only the buyer or the seller can request mediation".to_string()));
      }
      if let Some(note) = guard.note.take() {
        let note = required_text("Mediation note", &note, MAX_DESCRIPTION_CHARS)?;
        guard.note = Some(note);
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("escalate_claim", escalate_claim);
  p.on_step("notify_counterpart", common_steps::deliver_notifications::<MediationCtxData>);

  registry.register(p);
}

/// Flags the order for an administrator. A buyer without an open claim gets
/// one opened on the spot; a seller can only escalate an existing claim.
#[instrument(name = "mediation::escalate", skip(data), err)]
async fn escalate_claim(data: FlowData<MediationCtxData>) -> Result<StepControl> {
  let (pool, config, order, actor, note) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
      guard.actor,
      guard.note.clone(),
    )
  };
  let requested_by_buyer = order.is_buyer(actor.id);

  let mut tx = db::begin_write(&pool).await?;
  let open_claim = claims::find_claim(&mut *tx, order.id)
    .await?
    .filter(|c| c.status == ClaimStatus::Open);

  let (claim_id, opened_new_claim) = match open_claim {
    Some(claim) => (claim.id, false),
    None if requested_by_buyer => {
      let description = note.as_deref().unwrap_or(DEFAULT_MEDIATION_NOTE);
      (open_claim_in_tx(&mut *tx, &order, actor.id, ClaimType::Other, description).await?, true)
    }
    None => return Err(AppError::NotFound("There is no open claim to escalate".to_string())),
  };

  sqlx::query("UPDATE orders SET mediation_requested = 1, updated_at = ?1 WHERE id = ?2")
    .bind(Utc::now())
    .bind(order.id)
    .execute(&mut *tx)
    .await?;

  let who = if requested_by_buyer { "buyer" } else { "seller" };
  let mut entry = format!("The {} requested mediation by an administrator.", who);
  if let Some(note) = &note {
    entry.push_str(&format!(" Note: {}", note));
  }
  order_thread::append_system_message(&mut *tx, order.id, &entry).await?;
  tx.commit().await?;

  info!(order_id = %order.id, %claim_id, opened_new_claim, requested_by = who, "Mediation requested.");

  let mut guard = data.write();
  guard.claim_id = Some(claim_id);
  guard.opened_new_claim = opened_new_claim;
  if let Some(counterpart) = order.counterpart_of(actor.id) {
    guard.outbox.push(
      NewNotification::new(
        counterpart,
        "Mediation requested",
        format!("The {} asked an administrator to mediate this order.", who),
        Severity::Warning,
      )
      .with_link(config.order_link(order.id)),
    );
  }
  Ok(StepControl::Continue)
}

/// Escalates a dispute to an administrator.
#[instrument(name = "mediation::run", skip(state, note), fields(actor_id = %actor.id))]
pub async fn run_request_mediation(
  state: &AppState,
  actor: Actor,
  order_id: Uuid,
  note: Option<String>,
) -> Result<Claim> {
  let data = FlowData::new(MediationCtxData::new(state.clone(), actor, order_id, note));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "mediation")?;
  claims::find_claim(&state.db_pool, order_id)
    .await?
    .ok_or_else(|| AppError::Internal("Claim vanished after mediation".to_string()))
}
