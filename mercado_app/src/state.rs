// mercado_app/src/state.rs

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::services::blob_store::BlobStore;
use crate::services::notifier::Notifier;
use mercado_flow::FlowRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub db_pool: SqlitePool,
  pub flows: Arc<FlowRegistry<AppError>>,
  pub config: Arc<AppConfig>,
  pub blob_store: Arc<BlobStore>,
  pub notifier: Arc<dyn Notifier>,
}

impl AppState {
  /// Builds the state and registers every fulfillment flow on it.
  pub async fn build(config: AppConfig, db_pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Result<Self> {
    let blob_store = BlobStore::new(config.blob_dir.clone(), config.blob_max_bytes).await?;
    let state = AppState {
      db_pool,
      flows: Arc::new(FlowRegistry::new()),
      config: Arc::new(config),
      blob_store: Arc::new(blob_store),
      notifier,
    };
    crate::pipelines::register_all_flows(&state.flows);
    Ok(state)
  }
}
