// mercado_app/src/models/message.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One entry of an order's communication thread.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderMessage {
  pub id: Uuid,
  pub order_id: Uuid,
  pub sender_id: Option<Uuid>,
  pub is_system: bool,
  pub body: String,
  pub created_at: DateTime<Utc>,
}
