// mercado_app/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment-side status of an order. `Fulfilled` is only ever set by delivery
/// verification, never by payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  Pending,
  Paid,
  Disputed,
  Cancelled,
  Fulfilled,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Paid => "PAID",
      OrderStatus::Disputed => "DISPUTED",
      OrderStatus::Cancelled => "CANCELLED",
      OrderStatus::Fulfilled => "FULFILLED",
    }
  }
}

/// Physical progress of an order. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
  Pending,
  Assigned,
  OnWay,
  Delivered,
}

impl DeliveryStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DeliveryStatus::Pending => "PENDING",
      DeliveryStatus::Assigned => "ASSIGNED",
      DeliveryStatus::OnWay => "ON_WAY",
      DeliveryStatus::Delivered => "DELIVERED",
    }
  }
}

/// Fixed at checkout; selects which redemption path may ever advance the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
  Pickup,
  Delivery,
}

impl DeliveryMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      DeliveryMethod::Pickup => "PICKUP",
      DeliveryMethod::Delivery => "DELIVERY",
    }
  }
}

/// How the buyer pays. Only `Card` orders start out as `PAID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
  Card,
  Cash,
  Transfer,
}

impl PaymentMethod {
  pub fn initial_status(&self) -> OrderStatus {
    match self {
      PaymentMethod::Card => OrderStatus::Paid,
      PaymentMethod::Cash | PaymentMethod::Transfer => OrderStatus::Pending,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
  None,
  Completed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  /// Buyer. `None` for guest checkouts.
  pub user_id: Option<Uuid>,
  pub seller_id: Uuid,
  pub status: OrderStatus,
  pub payment_method: PaymentMethod,
  pub delivery_method: DeliveryMethod,
  pub delivery_status: DeliveryStatus,
  pub total_cents: i64,
  pub shipping_name: String,
  pub shipping_phone: String,
  pub shipping_address: Option<String>,
  pub shipping_lat: Option<f64>,
  pub shipping_lng: Option<f64>,
  pub pickup_code: Option<String>,
  pub security_keywords: Option<String>,
  pub courier_id: Option<Uuid>,
  pub scan_lat: Option<f64>,
  pub scan_lng: Option<f64>,
  pub geo_flagged: bool,
  pub delivered_at: Option<DateTime<Utc>>,
  pub proof_image: Option<String>,
  pub funds_released: bool,
  pub funds_release_at: Option<DateTime<Utc>>,
  pub cancellation_reason: Option<String>,
  pub refund_status: RefundStatus,
  pub mediation_requested: bool,
  pub stock_restored: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  pub fn is_buyer(&self, user_id: Uuid) -> bool {
    self.user_id == Some(user_id)
  }

  /// The other party of a buyer/seller pair, if there is one.
  pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
    if self.is_buyer(user_id) {
      Some(self.seller_id)
    } else if user_id == self.seller_id {
      self.user_id
    } else {
      None
    }
  }

  /// Strips the shared secrets. Only the buyer ever sees the pickup code and
  /// the security words.
  pub fn redacted(mut self) -> Self {
    self.pickup_code = None;
    self.security_keywords = None;
    self
  }
}
