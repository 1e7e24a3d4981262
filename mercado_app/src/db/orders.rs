// mercado_app/src/db/orders.rs

use crate::errors::{AppError, Result};
use crate::models::{Order, OrderItem};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

pub async fn find_order<'e, E>(exec: E, order_id: Uuid) -> Result<Option<Order>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
    .bind(order_id)
    .fetch_optional(exec)
    .await?;
  Ok(order)
}

pub async fn fetch_order<'e, E>(exec: E, order_id: Uuid) -> Result<Order>
where
  E: Executor<'e, Database = Sqlite>,
{
  find_order(exec, order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))
}

pub async fn fetch_items<'e, E>(exec: E, order_id: Uuid) -> Result<Vec<OrderItem>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ?1 ORDER BY rowid")
    .bind(order_id)
    .fetch_all(exec)
    .await?;
  Ok(items)
}

/// Distinct owners of the products in an order.
pub async fn seller_ids<'e, E>(exec: E, order_id: Uuid) -> Result<Vec<Uuid>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let ids = sqlx::query_scalar::<_, Uuid>(
    "SELECT DISTINCT p.seller_id FROM order_items oi JOIN products p ON p.id = oi.product_id WHERE oi.order_id = ?1",
  )
  .bind(order_id)
  .fetch_all(exec)
  .await?;
  Ok(ids)
}
