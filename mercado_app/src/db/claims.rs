// mercado_app/src/db/claims.rs

use crate::errors::{AppError, Result};
use crate::models::{Claim, ClaimStatus, ClaimType};
use chrono::Utc;
use sqlx::{Executor, Sqlite, SqliteConnection};
use uuid::Uuid;

pub async fn find_claim<'e, E>(exec: E, order_id: Uuid) -> Result<Option<Claim>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE order_id = ?1")
    .bind(order_id)
    .fetch_optional(exec)
    .await?;
  Ok(claim)
}

/// Opens a claim for `order_id`, or reopens the resolved one in place.
///
/// The upsert only fires when no claim is `OPEN`, so the duplicate check and
/// the write are a single statement.
pub async fn open_or_reopen(
  conn: &mut SqliteConnection,
  order_id: Uuid,
  claimant_id: Uuid,
  claim_type: ClaimType,
  description: &str,
) -> Result<Uuid> {
  let now = Utc::now();
  let result = sqlx::query(
    "INSERT INTO claims (id, order_id, user_id, claim_type, description, status, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
     ON CONFLICT(order_id) DO UPDATE SET \
       user_id = excluded.user_id, claim_type = excluded.claim_type, description = excluded.description, \
       status = excluded.status, updated_at = excluded.updated_at \
     WHERE claims.status <> 'OPEN'",
  )
  .bind(Uuid::new_v4())
  .bind(order_id)
  .bind(claimant_id)
  .bind(claim_type)
  .bind(description)
  .bind(ClaimStatus::Open)
  .bind(now)
  .execute(&mut *conn)
  .await?;

  if result.rows_affected() == 0 {
    return Err(AppError::DuplicateOpenClaim);
  }

  let claim_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM claims WHERE order_id = ?1")
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;
  Ok(claim_id)
}

/// Moves every `OPEN` claim of the order to `resolution`; returns how many moved.
pub async fn resolve_open<'e, E>(exec: E, order_id: Uuid, resolution: ClaimStatus) -> Result<u64>
where
  E: Executor<'e, Database = Sqlite>,
{
  let result = sqlx::query("UPDATE claims SET status = ?1, updated_at = ?2 WHERE order_id = ?3 AND status = 'OPEN'")
    .bind(resolution)
    .bind(Utc::now())
    .bind(order_id)
    .execute(exec)
    .await?;
  Ok(result.rows_affected())
}
