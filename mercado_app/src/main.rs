// mercado_app/src/main.rs

use mercado_app::config::AppConfig;
use mercado_app::db;
use mercado_app::pipelines::fund_release_pipeline::spawn_fund_release_sweeper;
use mercado_app::services::notifier::DbNotifier;
use mercado_app::state::AppState;
use mercado_app::telemetry;
use mercado_app::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  telemetry::init_tracing();
  tracing::info!("Starting Mercado fulfillment server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
    }
  };

  let db_pool = match db::connect(&app_config.database_url, app_config.database_max_connections).await {
    Ok(pool) => pool,
    Err(e) => {
      tracing::error!(error = %e, "Failed to prepare the database.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
  };

  let notifier = Arc::new(DbNotifier::new(db_pool.clone(), app_config.mail_sender.clone()));
  let app_state = match AppState::build(app_config, db_pool, notifier).await {
    Ok(state) => state,
    Err(e) => {
      tracing::error!(error = %e, "Failed to build application state.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
  };

  if app_state.config.fund_sweep_enabled {
    let _sweeper = spawn_fund_release_sweeper(
      app_state.clone(),
      Duration::from_secs(app_state.config.fund_sweep_interval_secs),
    );
  }

  let server_address = format!("{}:{}", app_state.config.server_host, app_state.config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
