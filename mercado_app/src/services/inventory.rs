// mercado_app/src/services/inventory.rs

//! Stock ledger. Every decrement is a conditional update, so two buyers racing
//! for the last unit cannot both succeed.

use crate::errors::{AppError, Result};
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockRequest {
  pub product_id: Uuid,
  pub quantity: i64,
}

/// A successfully reserved line with the price snapshot taken at reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedLine {
  pub product_id: Uuid,
  pub seller_id: Uuid,
  pub name: String,
  pub quantity: i64,
  pub unit_price_cents: i64,
}

impl ReservedLine {
  pub fn line_total_cents(&self) -> i64 {
    self.unit_price_cents * self.quantity
  }
}

#[derive(FromRow)]
struct ListedProduct {
  seller_id: Uuid,
  name: String,
  price_cents: i64,
}

/// Requests for the same product are merged, preserving first-seen order.
pub fn merge_requests(requests: &[StockRequest]) -> Vec<StockRequest> {
  let mut merged: Vec<StockRequest> = Vec::with_capacity(requests.len());
  for req in requests {
    match merged.iter_mut().find(|m| m.product_id == req.product_id) {
      Some(existing) => existing.quantity += req.quantity,
      None => merged.push(*req),
    }
  }
  merged
}

/// Decrements stock for every request inside the caller's transaction.
///
/// The first product that cannot cover its quantity aborts with
/// `InsufficientStock`; the caller drops the transaction, which rolls back the
/// decrements already applied. A product reaching zero is deactivated in the
/// same statement.
pub async fn reserve_stock(conn: &mut SqliteConnection, requests: &[StockRequest]) -> Result<Vec<ReservedLine>> {
  let mut reserved = Vec::with_capacity(requests.len());

  for req in merge_requests(requests) {
    let product = sqlx::query_as::<_, ListedProduct>("SELECT seller_id, name, price_cents FROM products WHERE id = ?1")
      .bind(req.product_id)
      .fetch_optional(&mut *conn)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Product {} not found", req.product_id)))?;

    let result = sqlx::query(
      "UPDATE products \
       SET stock = stock - ?1, \
           is_active = CASE WHEN stock - ?1 = 0 THEN 0 ELSE is_active END, \
           updated_at = ?2 \
       WHERE id = ?3 AND is_active = 1 AND stock >= ?1",
    )
    .bind(req.quantity)
    .bind(Utc::now())
    .bind(req.product_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
      info!(product_id = %req.product_id, requested = req.quantity, "Stock reservation refused.");
      return Err(AppError::InsufficientStock { product: product.name });
    }

    debug!(product_id = %req.product_id, quantity = req.quantity, "Stock reserved.");
    reserved.push(ReservedLine {
      product_id: req.product_id,
      seller_id: product.seller_id,
      name: product.name,
      quantity: req.quantity,
      unit_price_cents: product.price_cents,
    });
  }

  Ok(reserved)
}

/// Puts an order's quantities back on the shelf and reactivates the products.
///
/// Guarded by `orders.stock_restored`, so a second call fails with `Conflict`
/// instead of double-crediting.
pub async fn restore_order_stock(conn: &mut SqliteConnection, order_id: Uuid) -> Result<Vec<(Uuid, i64)>> {
  let now = Utc::now();
  let guard = sqlx::query("UPDATE orders SET stock_restored = 1, updated_at = ?1 WHERE id = ?2 AND stock_restored = 0")
    .bind(now)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
  if guard.rows_affected() == 0 {
    return Err(AppError::Conflict("Stock for this order was already restored".to_string()));
  }

  let lines = sqlx::query_as::<_, (Uuid, i64)>("SELECT product_id, quantity FROM order_items WHERE order_id = ?1")
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

  for (product_id, quantity) in &lines {
    sqlx::query("UPDATE products SET stock = stock + ?1, is_active = 1, updated_at = ?2 WHERE id = ?3")
      .bind(quantity)
      .bind(now)
      .bind(product_id)
      .execute(&mut *conn)
      .await?;
  }

  info!(%order_id, lines = lines.len(), "Order stock returned to inventory.");
  Ok(lines)
}
