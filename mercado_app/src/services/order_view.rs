// mercado_app/src/services/order_view.rs

use crate::db::{claims, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, Claim, Order, OrderItem, OrderMessage};
use crate::services::order_thread;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
  pub order: Order,
  pub items: Vec<OrderItem>,
  pub claim: Option<Claim>,
  pub messages: Vec<OrderMessage>,
}

/// An order as seen by `actor`.
///
/// Buyer, seller, assigned courier and staff may read it. The pickup code and
/// security words are only returned to the buyer.
pub async fn get_order(pool: &SqlitePool, order_id: Uuid, actor: &Actor) -> Result<OrderView> {
  let order = orders::fetch_order(pool, order_id).await?;

  let is_buyer = order.is_buyer(actor.id);
  let may_read = is_buyer
    || order.seller_id == actor.id
    || order.courier_id == Some(actor.id)
    || actor.is_admin()
    || actor.role == crate::models::Role::LogisticsAdmin;
  if !may_read {
    return Err(AppError::Forbidden("You are not a party to this order".to_string()));
  }

  let items = orders::fetch_items(pool, order_id).await?;
  let claim = claims::find_claim(pool, order_id).await?;
  let messages = order_thread::list_messages(pool, order_id).await?;

  Ok(OrderView {
    order: if is_buyer { order } else { order.redacted() },
    items,
    claim,
    messages,
  })
}
