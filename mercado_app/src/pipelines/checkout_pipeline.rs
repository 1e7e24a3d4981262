// mercado_app/src/pipelines/checkout_pipeline.rs

use crate::db::{self, users};
use crate::errors::{AppError, Result};
use crate::models::{DeliveryMethod, Severity};
use crate::pipelines::common_steps::{self, required_text};
use crate::pipelines::contexts::{CheckoutCtxData, CheckoutRequest, PlacedOrder};
use crate::pipelines::expect_completed;
use crate::services::inventory::{self, ReservedLine, StockRequest};
use crate::services::notifier::NewNotification;
use crate::services::{order_thread, secrets};
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const MAX_LINES: usize = 100;
const MAX_QUANTITY: i64 = 1_000;
const PICKUP_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
  pub orders: Vec<PlacedOrder>,
  pub grand_total_cents: i64,
}

pub fn register_checkout_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<CheckoutCtxData, AppError>::new(&[
    StepDef::required("validate_checkout_request"),
    StepDef::required("reserve_stock_and_create_orders"),
    StepDef::side_effect("notify_sellers"),
  ]);

  p.on_step("validate_checkout_request", |data: FlowData<CheckoutCtxData>| {
    Box::pin(async move {
      let request = data.read().request.clone();
      validate_request(&request)?;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("reserve_stock_and_create_orders", reserve_stock_and_create_orders);
  p.on_step("notify_sellers", common_steps::deliver_notifications::<CheckoutCtxData>);

  registry.register(p);
}

fn validate_request(request: &CheckoutRequest) -> Result<()> {
  if request.items.is_empty() {
    return Err(AppError::Validation("The cart is empty".to_string()));
  }
  if request.items.len() > MAX_LINES {
    return Err(AppError::Validation(format!("A checkout holds at most {} lines", MAX_LINES)));
  }
  if let Some(bad) = request.items.iter().find(|i| i.quantity <= 0 || i.quantity > MAX_QUANTITY) {
    return Err(AppError::Validation(format!(
      "Quantity for product {} must be between 1 and {}",
      bad.product_id, MAX_QUANTITY
    )));
  }

  required_text("Shipping name", &request.shipping.name, 200)?;
  required_text("Shipping phone", &request.shipping.phone, 40)?;
  if request.delivery_method == DeliveryMethod::Delivery {
    required_text("Shipping address", request.shipping.address.as_deref().unwrap_or_default(), 500)?;
  }
  if let Some(location) = &request.shipping.location {
    location.validate()?;
  }
  Ok(())
}

/// Lines grouped by seller, in the order the sellers first appear.
fn group_by_seller(lines: Vec<ReservedLine>) -> Vec<(Uuid, Vec<ReservedLine>)> {
  let mut groups: Vec<(Uuid, Vec<ReservedLine>)> = Vec::new();
  for line in lines {
    match groups.iter_mut().find(|(seller, _)| *seller == line.seller_id) {
      Some((_, group)) => group.push(line),
      None => groups.push((line.seller_id, vec![line])),
    }
  }
  groups
}

async fn unique_pickup_code(conn: &mut SqliteConnection) -> Result<String> {
  for _ in 0..PICKUP_CODE_ATTEMPTS {
    let candidate = secrets::new_pickup_code();
    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE pickup_code = ?1")
      .bind(&candidate)
      .fetch_one(&mut *conn)
      .await?;
    if taken == 0 {
      return Ok(candidate);
    }
  }
  Err(AppError::Internal("Could not allocate a unique pickup code".to_string()))
}

#[instrument(name = "checkout::reserve_and_create", skip(data), err)]
async fn reserve_stock_and_create_orders(data: FlowData<CheckoutCtxData>) -> Result<StepControl> {
  let (pool, config, buyer_id, request) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      guard.buyer_id,
      guard.request.clone(),
    )
  };

  let requests: Vec<StockRequest> = request
    .items
    .iter()
    .map(|i| StockRequest {
      product_id: i.product_id,
      quantity: i.quantity,
    })
    .collect();

  let mut tx = db::begin_write(&pool).await?;

  if let Some(buyer) = buyer_id {
    if users::find_user(&mut *tx, buyer).await?.is_none() {
      return Err(AppError::Auth(format!("Unknown buyer {}", buyer)));
    }
  }

  let reserved = inventory::reserve_stock(&mut *tx, &requests).await?;

  let now = Utc::now();
  let status = request.payment_method.initial_status();
  let shipping = &request.shipping;
  let mut placed = Vec::new();
  let mut outbox = Vec::new();

  for (seller_id, lines) in group_by_seller(reserved) {
    let order_id = Uuid::new_v4();
    let total_cents: i64 = lines.iter().map(ReservedLine::line_total_cents).sum();
    let (pickup_code, security_keywords) = match request.delivery_method {
      DeliveryMethod::Pickup => (Some(unique_pickup_code(&mut *tx).await?), None),
      DeliveryMethod::Delivery => (None, Some(secrets::new_security_keywords())),
    };

    sqlx::query(
      "INSERT INTO orders (id, user_id, seller_id, status, payment_method, delivery_method, delivery_status, \
         total_cents, shipping_name, shipping_phone, shipping_address, shipping_lat, shipping_lng, \
         pickup_code, security_keywords, created_at, updated_at) \
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
    )
    .bind(order_id)
    .bind(buyer_id)
    .bind(seller_id)
    .bind(status)
    .bind(request.payment_method)
    .bind(request.delivery_method)
    .bind(total_cents)
    .bind(shipping.name.trim())
    .bind(shipping.phone.trim())
    .bind(shipping.address.as_deref().map(str::trim))
    .bind(shipping.location.map(|l| l.lat))
    .bind(shipping.location.map(|l| l.lng))
    .bind(&pickup_code)
    .bind(&security_keywords)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for line in &lines {
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents) VALUES (?1, ?2, ?3, ?4, ?5)",
      )
      .bind(Uuid::new_v4())
      .bind(order_id)
      .bind(line.product_id)
      .bind(line.quantity)
      .bind(line.unit_price_cents)
      .execute(&mut *tx)
      .await?;
    }

    order_thread::append_system_message(
      &mut *tx,
      order_id,
      &format!(
        "Order created: {} item(s), {} delivery, payment {}.",
        lines.iter().map(|l| l.quantity).sum::<i64>(),
        request.delivery_method.as_str(),
        status.as_str()
      ),
    )
    .await?;

    outbox.push(
      NewNotification::new(
        seller_id,
        "New order",
        format!("You have a new order with {} line(s).", lines.len()),
        Severity::Info,
      )
      .with_link(config.order_link(order_id)),
    );

    placed.push(PlacedOrder {
      order_id,
      seller_id,
      status,
      total_cents,
      pickup_code,
      security_keywords,
    });
  }

  tx.commit().await?;

  info!(buyer = ?buyer_id, orders = placed.len(), "Checkout committed.");
  {
    let mut guard = data.write();
    guard.placed = placed;
    guard.outbox.extend(outbox);
  }
  Ok(StepControl::Continue)
}

/// Reserves stock and creates one order per seller, atomically.
#[instrument(name = "checkout::run", skip(state, request), fields(lines = request.items.len()))]
pub async fn run_checkout(state: &AppState, buyer_id: Option<Uuid>, request: CheckoutRequest) -> Result<CheckoutReceipt> {
  let data = FlowData::new(CheckoutCtxData::new(state.clone(), buyer_id, request));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "checkout")?;

  let orders = data.read().placed.clone();
  let grand_total_cents = orders.iter().map(|o| o.total_cents).sum();
  Ok(CheckoutReceipt {
    orders,
    grand_total_cents,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::PaymentMethod;
  use crate::pipelines::contexts::{CheckoutItem, ShippingDetails};

  fn request(delivery_method: DeliveryMethod, address: Option<&str>, quantity: i64) -> CheckoutRequest {
    CheckoutRequest {
      items: vec![CheckoutItem {
        product_id: Uuid::new_v4(),
        quantity,
      }],
      shipping: ShippingDetails {
        name: "Ana".into(),
        phone: "555-0100".into(),
        address: address.map(str::to_string),
        location: None,
      },
      payment_method: PaymentMethod::Card,
      delivery_method,
    }
  }

  #[test]
  fn delivery_requires_an_address() {
    assert!(validate_request(&request(DeliveryMethod::Delivery, None, 1)).is_err());
    assert!(validate_request(&request(DeliveryMethod::Delivery, Some("  "), 1)).is_err());
    assert!(validate_request(&request(DeliveryMethod::Delivery, Some("Calle 1"), 1)).is_ok());
    assert!(validate_request(&request(DeliveryMethod::Pickup, None, 1)).is_ok());
  }

  #[test]
  fn rejects_non_positive_quantities() {
    assert!(validate_request(&request(DeliveryMethod::Pickup, None, 0)).is_err());
    assert!(validate_request(&request(DeliveryMethod::Pickup, None, -3)).is_err());
  }

  #[test]
  fn groups_lines_by_seller_in_first_seen_order() {
    let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
    let line = |seller_id| ReservedLine {
      product_id: Uuid::new_v4(),
      seller_id,
      name: "x".into(),
      quantity: 1,
      unit_price_cents: 100,
    };
    let groups = group_by_seller(vec![line(s2), line(s1), line(s2)]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].0, s2);
    assert_eq!(groups[0].1.len(), 2);
    assert_eq!(groups[1].0, s1);
  }
}
