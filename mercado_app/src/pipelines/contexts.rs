// mercado_app/src/pipelines/contexts.rs

//! Data carried through each flow. Handlers receive these wrapped in
//! `mercado_flow::FlowData`.

use crate::models::{Actor, Claim, ClaimType, DeliveryMethod, Order, OrderStatus, PaymentMethod};
use crate::services::geo::GeoPoint;
use crate::services::notifier::NewNotification;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contexts that queue notifications for a trailing delivery step.
pub trait Outbox {
  fn app_state(&self) -> &AppState;
  fn take_outbox(&mut self) -> Vec<NewNotification>;
}

/// Contexts whose flow ends by refreshing seller reputations.
pub trait ReputationTargets {
  fn app_state(&self) -> &AppState;
  fn sellers(&self) -> Vec<Uuid>;
}

macro_rules! impl_outbox {
  ($($ctx:ty),+ $(,)?) => {
    $(
      impl Outbox for $ctx {
        fn app_state(&self) -> &AppState {
          &self.app_state
        }

        fn take_outbox(&mut self) -> Vec<NewNotification> {
          std::mem::take(&mut self.outbox)
        }
      }
    )+
  };
}

// --- Checkout ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
  pub product_id: Uuid,
  pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
  pub name: String,
  pub phone: String,
  pub address: Option<String>,
  pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
  pub items: Vec<CheckoutItem>,
  pub shipping: ShippingDetails,
  pub payment_method: PaymentMethod,
  pub delivery_method: DeliveryMethod,
}

/// One per-seller order created by a checkout. The secrets are only ever
/// returned here and to the buyer's own order view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
  pub order_id: Uuid,
  pub seller_id: Uuid,
  pub status: OrderStatus,
  pub total_cents: i64,
  pub pickup_code: Option<String>,
  pub security_keywords: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub buyer_id: Option<Uuid>,
  pub request: CheckoutRequest,
  pub placed: Vec<PlacedOrder>,
  pub outbox: Vec<NewNotification>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, buyer_id: Option<Uuid>, request: CheckoutRequest) -> Self {
    Self {
      app_state,
      buyer_id,
      request,
      placed: Vec::new(),
      outbox: Vec::new(),
    }
  }
}

// --- Delivery verification ---

#[derive(Clone)]
pub struct PickupScanCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub raw_code: String,
  pub location: Option<GeoPoint>,
  pub code: String,
  pub order: Option<Order>,
  pub seller_ids: Vec<Uuid>,
  pub outbox: Vec<NewNotification>,
}

impl PickupScanCtxData {
  pub fn new(app_state: AppState, actor: Actor, raw_code: String, location: Option<GeoPoint>) -> Self {
    Self {
      app_state,
      actor,
      raw_code,
      location,
      code: String::new(),
      order: None,
      seller_ids: Vec::new(),
      outbox: Vec::new(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ProofPhoto {
  pub bytes: Vec<u8>,
  pub content_type: String,
}

#[derive(Clone)]
pub struct CourierScanCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub keywords: String,
  pub proof: Option<ProofPhoto>,
  pub location: Option<GeoPoint>,
  pub order: Option<Order>,
  pub distance_meters: Option<f64>,
  pub geo_flagged: bool,
  pub proof_ref: Option<String>,
  pub funds_release_at: Option<DateTime<Utc>>,
  pub seller_ids: Vec<Uuid>,
  pub outbox: Vec<NewNotification>,
}

impl CourierScanCtxData {
  pub fn new(
    app_state: AppState,
    actor: Actor,
    order_id: Uuid,
    keywords: String,
    proof: Option<ProofPhoto>,
    location: Option<GeoPoint>,
  ) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      keywords,
      proof,
      location,
      order: None,
      distance_meters: None,
      geo_flagged: false,
      proof_ref: None,
      funds_release_at: None,
      seller_ids: Vec::new(),
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct ConfirmReceiptCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub outbox: Vec<NewNotification>,
}

impl ConfirmReceiptCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      order: None,
      outbox: Vec::new(),
    }
  }
}

// --- Order lifecycle ---

#[derive(Clone)]
pub struct CancelOrderCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub reason: String,
  pub order: Option<Order>,
  pub outbox: Vec<NewNotification>,
}

impl CancelOrderCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid, reason: String) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      reason,
      order: None,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct AssignCourierCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub courier_id: Uuid,
  pub order: Option<Order>,
  pub outbox: Vec<NewNotification>,
}

impl AssignCourierCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid, courier_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      courier_id,
      order: None,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct StartRouteCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub outbox: Vec<NewNotification>,
}

impl StartRouteCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      order: None,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct RestockCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub restored: Vec<(Uuid, i64)>,
  pub outbox: Vec<NewNotification>,
}

impl RestockCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      order: None,
      restored: Vec::new(),
      outbox: Vec::new(),
    }
  }
}

// --- Claims ---

#[derive(Clone)]
pub struct OpenClaimCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub claim_type: ClaimType,
  pub description: String,
  pub order: Option<Order>,
  pub claim_id: Option<Uuid>,
  pub outbox: Vec<NewNotification>,
}

impl OpenClaimCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid, claim_type: ClaimType, description: String) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      claim_type,
      description,
      order: None,
      claim_id: None,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct RefundCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub claims_resolved: u64,
  pub transcript_sent: bool,
  pub outbox: Vec<NewNotification>,
}

impl RefundCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      order: None,
      claims_resolved: 0,
      transcript_sent: false,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct AdminCloseClaimCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub outbox: Vec<NewNotification>,
}

impl AdminCloseClaimCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      order: None,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct WithdrawClaimCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub claim: Option<Claim>,
  pub order: Option<Order>,
  pub outbox: Vec<NewNotification>,
}

impl WithdrawClaimCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      claim: None,
      order: None,
      outbox: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct MediationCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub order_id: Uuid,
  pub note: Option<String>,
  pub order: Option<Order>,
  pub claim_id: Option<Uuid>,
  pub opened_new_claim: bool,
  pub outbox: Vec<NewNotification>,
}

impl MediationCtxData {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid, note: Option<String>) -> Self {
    Self {
      app_state,
      actor,
      order_id,
      note,
      order: None,
      claim_id: None,
      opened_new_claim: false,
      outbox: Vec::new(),
    }
  }
}

// --- Reputation ---

#[derive(Clone)]
pub struct ReviewCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub product_id: Uuid,
  pub rating: i64,
  pub comment: Option<String>,
  pub seller_id: Option<Uuid>,
  pub review_id: Option<Uuid>,
}

impl ReviewCtxData {
  pub fn new(app_state: AppState, actor: Actor, product_id: Uuid, rating: i64, comment: Option<String>) -> Self {
    Self {
      app_state,
      actor,
      product_id,
      rating,
      comment,
      seller_id: None,
      review_id: None,
    }
  }
}

// --- Background ---

#[derive(Clone)]
pub struct FundSweepCtxData {
  pub app_state: AppState,
  pub now: DateTime<Utc>,
  /// `(order_id, seller_id)` pairs whose holding window has passed.
  pub due: Vec<(Uuid, Uuid)>,
  pub released: Vec<Uuid>,
  pub outbox: Vec<NewNotification>,
}

impl FundSweepCtxData {
  pub fn new(app_state: AppState, now: DateTime<Utc>) -> Self {
    Self {
      app_state,
      now,
      due: Vec::new(),
      released: Vec::new(),
      outbox: Vec::new(),
    }
  }
}

impl_outbox!(
  CheckoutCtxData,
  PickupScanCtxData,
  CourierScanCtxData,
  ConfirmReceiptCtxData,
  CancelOrderCtxData,
  AssignCourierCtxData,
  StartRouteCtxData,
  RestockCtxData,
  OpenClaimCtxData,
  RefundCtxData,
  AdminCloseClaimCtxData,
  WithdrawClaimCtxData,
  MediationCtxData,
  FundSweepCtxData,
);

impl ReputationTargets for PickupScanCtxData {
  fn app_state(&self) -> &AppState {
    &self.app_state
  }

  fn sellers(&self) -> Vec<Uuid> {
    self.seller_ids.clone()
  }
}

impl ReputationTargets for CourierScanCtxData {
  fn app_state(&self) -> &AppState {
    &self.app_state
  }

  fn sellers(&self) -> Vec<Uuid> {
    self.seller_ids.clone()
  }
}

impl ReputationTargets for ReviewCtxData {
  fn app_state(&self) -> &AppState {
    &self.app_state
  }

  fn sellers(&self) -> Vec<Uuid> {
    self.seller_id.into_iter().collect()
  }
}
