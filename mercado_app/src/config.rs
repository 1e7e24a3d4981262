// mercado_app/src/config.rs

use crate::errors::{AppError, Result};
use chrono::Duration;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub database_max_connections: u32,
  pub app_base_url: String,

  // Proof-of-delivery storage
  pub blob_dir: PathBuf,
  pub blob_max_bytes: usize,

  pub policy: FulfillmentPolicy,

  pub fund_sweep_enabled: bool,
  pub fund_sweep_interval_secs: u64,

  pub mail_sender: String,
}

/// Longest accepted courier holding window: one year.
pub const MAX_COURIER_HOLD_HOURS: i64 = 24 * 365;

/// Tunables of the delivery verification protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FulfillmentPolicy {
  /// Holding window between a courier scan and the release of funds.
  pub courier_hold_hours: i64,
  /// Scans farther than this from the shipping coordinates get flagged.
  pub geo_tolerance_meters: f64,
}

impl FulfillmentPolicy {
  pub fn courier_hold(&self) -> Duration {
    Duration::hours(self.courier_hold_hours.clamp(0, MAX_COURIER_HOLD_HOURS))
  }
}

impl Default for FulfillmentPolicy {
  fn default() -> Self {
    Self {
      courier_hold_hours: 24,
      geo_tolerance_meters: 300.0,
    }
  }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  env::var(name)
    .unwrap_or_else(|_| default.to_string())
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str, default: &str| env::var(var_name).unwrap_or_else(|_| default.to_string());

    let server_host = get_env("SERVER_HOST", "127.0.0.1");
    let server_port = parse_var::<u16>("SERVER_PORT", "8080")?;
    let database_url = get_env("DATABASE_URL", "sqlite://mercado.db?mode=rwc");
    let database_max_connections = parse_var::<u32>("DATABASE_MAX_CONNECTIONS", "5")?;
    if database_max_connections == 0 {
      return Err(AppError::Config("DATABASE_MAX_CONNECTIONS must be at least 1".to_string()));
    }
    let app_base_url = get_env("APP_BASE_URL", &format!("http://{}:{}", server_host, server_port));

    let blob_dir = PathBuf::from(get_env("BLOB_DIR", "./blobs"));
    let blob_max_bytes = parse_var::<usize>("BLOB_MAX_BYTES", "5242880")?;

    let courier_hold_hours = parse_var::<i64>("COURIER_HOLD_HOURS", "24")?;
    if !(0..=MAX_COURIER_HOLD_HOURS).contains(&courier_hold_hours) {
      return Err(AppError::Config(format!(
        "COURIER_HOLD_HOURS must be between 0 and {}",
        MAX_COURIER_HOLD_HOURS
      )));
    }
    let geo_tolerance_meters = parse_var::<f64>("GEO_TOLERANCE_METERS", "300")?;
    if !geo_tolerance_meters.is_finite() || geo_tolerance_meters <= 0.0 {
      return Err(AppError::Config("GEO_TOLERANCE_METERS must be a positive number".to_string()));
    }

    let fund_sweep_enabled = parse_var::<bool>("FUND_SWEEP_ENABLED", "true")?;
    let fund_sweep_interval_secs = parse_var::<u64>("FUND_SWEEP_INTERVAL_SECS", "300")?;
    if fund_sweep_interval_secs == 0 {
      return Err(AppError::Config("FUND_SWEEP_INTERVAL_SECS must be at least 1".to_string()));
    }

    let mail_sender = get_env("MAIL_SENDER", "noreply@mercado.local");

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      database_max_connections,
      app_base_url,
      blob_dir,
      blob_max_bytes,
      policy: FulfillmentPolicy {
        courier_hold_hours,
        geo_tolerance_meters,
      },
      fund_sweep_enabled,
      fund_sweep_interval_secs,
      mail_sender,
    })
  }

  /// Configuration with every default applied, independent of the process
  /// environment. Used by embedders and tests.
  pub fn with_defaults(database_url: impl Into<String>, blob_dir: impl Into<PathBuf>) -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: database_url.into(),
      database_max_connections: 1,
      app_base_url: "http://127.0.0.1:8080".to_string(),
      blob_dir: blob_dir.into(),
      blob_max_bytes: 5 * 1024 * 1024,
      policy: FulfillmentPolicy::default(),
      fund_sweep_enabled: false,
      fund_sweep_interval_secs: 300,
      mail_sender: "noreply@mercado.local".to_string(),
    }
  }

  /// Link to an order page, used in notifications.
  pub fn order_link(&self, order_id: uuid::Uuid) -> String {
    format!("{}/orders/{}", self.app_base_url.trim_end_matches('/'), order_id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const VARS: &[&str] = &[
    "SERVER_PORT",
    "DATABASE_URL",
    "COURIER_HOLD_HOURS",
    "GEO_TOLERANCE_METERS",
    "FUND_SWEEP_INTERVAL_SECS",
    "APP_BASE_URL",
  ];

  fn clear() {
    for v in VARS {
      env::remove_var(v);
    }
  }

  #[test]
  #[serial]
  fn defaults_apply_when_unset() {
    clear();
    let cfg = AppConfig::from_env().expect("defaults should load");
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.policy, FulfillmentPolicy::default());
    assert_eq!(cfg.policy.courier_hold(), Duration::hours(24));
  }

  #[test]
  #[serial]
  fn rejects_bad_port() {
    clear();
    env::set_var("SERVER_PORT", "not-a-port");
    let err = AppConfig::from_env().unwrap_err();
    assert!(matches!(err, AppError::Config(m) if m.contains("SERVER_PORT")));
    clear();
  }

  #[test]
  #[serial]
  fn rejects_non_positive_geo_tolerance() {
    clear();
    env::set_var("GEO_TOLERANCE_METERS", "0");
    assert!(matches!(AppConfig::from_env(), Err(AppError::Config(_))));
    clear();
  }

  #[test]
  #[serial]
  fn rejects_courier_hold_outside_bounds() {
    clear();
    env::set_var("COURIER_HOLD_HOURS", "-1");
    assert!(matches!(AppConfig::from_env(), Err(AppError::Config(m)) if m.contains("COURIER_HOLD_HOURS")));
    env::set_var("COURIER_HOLD_HOURS", "9223372036854775807");
    assert!(matches!(AppConfig::from_env(), Err(AppError::Config(m)) if m.contains("COURIER_HOLD_HOURS")));
    env::set_var("COURIER_HOLD_HOURS", &MAX_COURIER_HOLD_HOURS.to_string());
    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.policy.courier_hold(), Duration::hours(MAX_COURIER_HOLD_HOURS));
    clear();
  }

  #[test]
  #[serial]
  fn order_link_uses_base_url() {
    clear();
    env::set_var("APP_BASE_URL", "https://shop.example/");
    let cfg = AppConfig::from_env().unwrap();
    let id = uuid::Uuid::nil();
    assert_eq!(cfg.order_link(id), format!("https://shop.example/orders/{}", id));
    clear();
  }
}
