// mercado_app/src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  User,
  Admin,
  Driver,
  LogisticsAdmin,
}

impl std::str::FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "USER" => Ok(Role::User),
      "ADMIN" => Ok(Role::Admin),
      "DRIVER" => Ok(Role::Driver),
      "LOGISTICS_ADMIN" => Ok(Role::LogisticsAdmin),
      other => Err(format!("unknown role '{}'", other)),
    }
  }
}

/// Seller trust band derived from the reputation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReputationTier {
  Platinum,
  Verde,
  Amarillo,
  Naranja,
  Rojo,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: Uuid,
  pub email: String,
  pub role: Role,
  pub is_verified: bool,
  pub reputation_score: i64,
  pub reputation_tier: ReputationTier,
  pub created_at: DateTime<Utc>,
}

/// The caller of an operation, passed explicitly into every flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
  pub id: Uuid,
  pub role: Role,
}

impl Actor {
  pub fn new(id: Uuid, role: Role) -> Self {
    Self { id, role }
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  /// Couriers and the staff that dispatch them.
  pub fn is_logistics(&self) -> bool {
    matches!(self.role, Role::Driver | Role::LogisticsAdmin | Role::Admin)
  }
}
