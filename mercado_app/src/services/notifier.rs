// mercado_app/src/services/notifier.rs

use crate::errors::Result;
use crate::models::Severity;
use crate::services::mailer;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// An in-app notification waiting to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
  pub user_id: Uuid,
  pub title: String,
  pub message: String,
  pub link: Option<String>,
  pub severity: Severity,
}

impl NewNotification {
  pub fn new(user_id: Uuid, title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
    Self {
      user_id,
      title: title.into(),
      message: message.into(),
      link: None,
      severity,
    }
  }

  pub fn with_link(mut self, link: String) -> Self {
    self.link = Some(link);
    self
  }
}

/// Delivery channel for user-facing messages.
///
/// Flows call this after their state change has committed; a failure here is
/// logged by the flow and never undoes the change.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, notification: NewNotification) -> Result<()>;

  async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Stores notifications in the `notifications` table and mails through
/// [`mailer`].
pub struct DbNotifier {
  pool: SqlitePool,
  sender: String,
}

impl DbNotifier {
  pub fn new(pool: SqlitePool, sender: impl Into<String>) -> Self {
    Self {
      pool,
      sender: sender.into(),
    }
  }
}

#[async_trait]
impl Notifier for DbNotifier {
  async fn notify(&self, n: NewNotification) -> Result<()> {
    sqlx::query(
      "INSERT INTO notifications (id, user_id, title, message, link, severity, is_read, created_at) \
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
    )
    .bind(Uuid::new_v4())
    .bind(n.user_id)
    .bind(&n.title)
    .bind(&n.message)
    .bind(&n.link)
    .bind(n.severity)
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;
    debug!(user_id = %n.user_id, title = %n.title, "Notification stored.");
    Ok(())
  }

  async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
    mailer::send_mail(&self.sender, to, subject, body).await?;
    Ok(())
  }
}
