// mercado_app/src/models/claim.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
  NotReceived,
  Damaged,
  Other,
}

impl ClaimType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ClaimType::NotReceived => "NOT_RECEIVED",
      ClaimType::Damaged => "DAMAGED",
      ClaimType::Other => "OTHER",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
  Open,
  ResolvedRefunded,
  ResolvedReleased,
}

/// At most one per order (unique on `order_id`); resolved claims are reopened
/// in place.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
  pub id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub claim_type: ClaimType,
  pub description: String,
  pub status: ClaimStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
