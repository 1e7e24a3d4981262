// mercado_app/src/db/mod.rs

//! Pool setup plus the queries shared by several flows.

pub mod claims;
pub mod orders;
pub mod users;

use crate::errors::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Opens the pool and applies embedded migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
  let options = SqliteConnectOptions::from_str(database_url)?
    .create_if_missing(true)
    .foreign_keys(true)
    .busy_timeout(Duration::from_secs(5));
  let pool = SqlitePoolOptions::new()
    .max_connections(max_connections)
    .connect_with(options)
    .await?;
  migrate(&pool).await?;
  info!(max_connections, "Database pool ready.");
  Ok(pool)
}

/// Starts a transaction that takes SQLite's write lock up front.
///
/// A deferred transaction that reads before writing cannot upgrade its lock
/// while another writer holds it and fails with SQLITE_BUSY instead of
/// waiting; `BEGIN IMMEDIATE` queues behind the busy timeout.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
  Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
  sqlx::migrate!("./migrations").run(pool).await?;
  Ok(())
}
