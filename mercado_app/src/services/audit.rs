// mercado_app/src/services/audit.rs

use crate::errors::AppError;
use crate::models::Actor;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{error, warn};
use uuid::Uuid;

/// Records a rejected delivery verification and hands the error back.
///
/// The attempt is logged at warn and persisted; if persisting fails that is
/// logged too, but the caller still gets the original security error.
pub async fn reject_verification(pool: &SqlitePool, order_id: Uuid, actor: &Actor, err: AppError) -> AppError {
  warn!(%order_id, actor_id = %actor.id, role = ?actor.role, reason = err.code(), "Delivery verification rejected.");

  let stored = sqlx::query(
    "INSERT INTO verification_attempts (id, order_id, actor_id, reason, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
  )
  .bind(Uuid::new_v4())
  .bind(order_id)
  .bind(actor.id)
  .bind(err.code())
  .bind(Utc::now())
  .execute(pool)
  .await;

  if let Err(db_err) = stored {
    error!(%order_id, error = %db_err, "Failed to persist verification attempt.");
  }
  err
}
