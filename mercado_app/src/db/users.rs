// mercado_app/src/db/users.rs

use crate::errors::Result;
use crate::models::{Role, User};
use chrono::Utc;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

pub async fn find_user<'e, E>(exec: E, user_id: Uuid) -> Result<Option<User>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
    .bind(user_id)
    .fetch_optional(exec)
    .await?;
  Ok(user)
}

/// Inserts a user row. Account management lives outside this core; this is
/// what seeding and tests use.
pub async fn insert_user<'e, E>(exec: E, email: &str, role: Role, is_verified: bool) -> Result<Uuid>
where
  E: Executor<'e, Database = Sqlite>,
{
  let id = Uuid::new_v4();
  sqlx::query(
    "INSERT INTO users (id, email, role, is_verified, reputation_score, reputation_tier, created_at) \
     VALUES (?1, ?2, ?3, ?4, 20, 'NARANJA', ?5)",
  )
  .bind(id)
  .bind(email)
  .bind(role)
  .bind(is_verified)
  .bind(Utc::now())
  .execute(exec)
  .await?;
  Ok(id)
}

/// Inserts a listed product owned by `seller_id`.
pub async fn insert_product<'e, E>(exec: E, seller_id: Uuid, name: &str, price_cents: i64, stock: i64) -> Result<Uuid>
where
  E: Executor<'e, Database = Sqlite>,
{
  let id = Uuid::new_v4();
  let now = Utc::now();
  sqlx::query(
    "INSERT INTO products (id, seller_id, name, price_cents, stock, is_active, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
  )
  .bind(id)
  .bind(seller_id)
  .bind(name)
  .bind(price_cents)
  .bind(stock)
  .bind(stock > 0)
  .bind(now)
  .execute(exec)
  .await?;
  Ok(id)
}
