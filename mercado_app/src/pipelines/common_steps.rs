// mercado_app/src/pipelines/common_steps.rs

//! Steps shared by several flows, plus small helpers used inside steps.

use crate::errors::{AppError, Result};
use crate::models::{Actor, Order};
use crate::pipelines::contexts::{Outbox, ReputationTargets};
use crate::services::reputation;
use mercado_flow::{FlowData, StepControl};
use tracing::{info, instrument, warn};

/// Sends every queued notification. Runs as a side-effect step, so the
/// error returned on partial failure is logged by the flow and ignored.
#[instrument(name = "common_step::deliver_notifications", skip(data))]
pub async fn deliver_notifications<T>(data: FlowData<T>) -> Result<StepControl>
where
  T: Outbox + Send + Sync + 'static,
{
  let (notifier, pending) = {
    let mut guard = data.write();
    (guard.app_state().notifier.clone(), guard.take_outbox())
  };

  let total = pending.len();
  let mut failed = 0usize;
  for notification in pending {
    let user_id = notification.user_id;
    if let Err(e) = notifier.notify(notification).await {
      warn!(%user_id, error = %e, "Notification delivery failed.");
      failed += 1;
    }
  }

  if failed > 0 {
    return Err(AppError::Internal(format!("{} of {} notifications failed", failed, total)));
  }
  info!(delivered = total, "Notifications delivered.");
  Ok(StepControl::Continue)
}

/// Recomputes the reputation of every seller the context points at.
#[instrument(name = "common_step::refresh_reputation", skip(data))]
pub async fn refresh_seller_reputation<T>(data: FlowData<T>) -> Result<StepControl>
where
  T: ReputationTargets + Send + Sync + 'static,
{
  let (pool, sellers) = {
    let guard = data.read();
    (guard.app_state().db_pool.clone(), guard.sellers())
  };

  let mut conn = pool.acquire().await?;
  for seller_id in sellers {
    reputation::recompute(&mut *conn, seller_id).await?;
  }
  Ok(StepControl::Continue)
}

/// Pulls the loaded order out of a context, failing loudly if an earlier step
/// did not set it.
pub fn loaded(order: &Option<Order>) -> Result<Order> {
  order
    .clone()
    .ok_or_else(|| AppError::Internal("Order missing from flow context".to_string()))
}

pub fn require_buyer(order: &Order, actor: &Actor) -> Result<()> {
  match order.user_id {
    None => Err(AppError::Forbidden("Guest orders cannot be managed here".to_string())),
    Some(buyer) if buyer == actor.id => Ok(()),
    Some(_) => Err(AppError::Forbidden("Only the buyer can do this".to_string())),
  }
}

pub fn require_seller_or_admin(order: &Order, actor: &Actor) -> Result<()> {
  if order.seller_id == actor.id || actor.is_admin() {
    Ok(())
  } else {
    Err(AppError::Forbidden("Only the seller or an administrator can do this".to_string()))
  }
}

/// Trims free text and enforces `1..=max_chars` characters.
pub fn required_text(field: &str, raw: &str, max_chars: usize) -> Result<String> {
  let text = raw.trim();
  if text.is_empty() {
    return Err(AppError::Validation(format!("{} is required", field)));
  }
  if text.chars().count() > max_chars {
    return Err(AppError::Validation(format!("{} exceeds {} characters", field, max_chars)));
  }
  Ok(text.to_string())
}
