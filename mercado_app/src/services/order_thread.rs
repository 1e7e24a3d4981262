// mercado_app/src/services/order_thread.rs

//! Per-order communication thread. System entries are written in the same
//! transaction as the transition they describe.

use crate::errors::Result;
use crate::models::OrderMessage;
use chrono::Utc;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

pub async fn append_system_message<'e, E>(exec: E, order_id: Uuid, body: &str) -> Result<()>
where
  E: Executor<'e, Database = Sqlite>,
{
  sqlx::query(
    "INSERT INTO order_messages (id, order_id, sender_id, is_system, body, created_at) VALUES (?1, ?2, NULL, 1, ?3, ?4)",
  )
  .bind(Uuid::new_v4())
  .bind(order_id)
  .bind(body)
  .bind(Utc::now())
  .execute(exec)
  .await?;
  Ok(())
}

pub async fn list_messages<'e, E>(exec: E, order_id: Uuid) -> Result<Vec<OrderMessage>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let messages = sqlx::query_as::<_, OrderMessage>(
    "SELECT * FROM order_messages WHERE order_id = ?1 ORDER BY created_at, rowid",
  )
  .bind(order_id)
  .fetch_all(exec)
  .await?;
  Ok(messages)
}

/// Plain-text rendering of a thread, one line per message.
pub fn render_transcript(order_id: Uuid, messages: &[OrderMessage]) -> String {
  let mut out = format!("Conversation history for order {}\n\n", order_id);
  for m in messages {
    let who = match (m.is_system, m.sender_id) {
      (true, _) => "SYSTEM".to_string(),
      (false, Some(id)) => id.to_string(),
      (false, None) => "unknown".to_string(),
    };
    out.push_str(&format!("[{}] {}: {}\n", m.created_at.format("%Y-%m-%d %H:%M UTC"), who, m.body));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transcript_marks_system_lines() {
    let order_id = Uuid::nil();
    let msg = OrderMessage {
      id: Uuid::new_v4(),
      order_id,
      sender_id: None,
      is_system: true,
      body: "Order created".into(),
      created_at: Utc::now(),
    };
    let text = render_transcript(order_id, &[msg]);
    assert!(text.starts_with("Conversation history for order 00000000"));
    assert!(text.contains("SYSTEM: Order created"));
  }
}
