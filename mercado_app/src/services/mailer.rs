// mercado_app/src/services/mailer.rs

//! Outbound mail. There is no SMTP relay in this deployment; messages are
//! logged and given a message id, which is enough for the transcript flow.

use crate::errors::{AppError, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct SentMail {
  pub to: String,
  pub subject: String,
  pub message_id: String,
}

pub async fn send_mail(from: &str, to: &str, subject: &str, body: &str) -> Result<SentMail> {
  if !to.contains('@') {
    return Err(AppError::Validation(format!("Invalid recipient address '{}'", to)));
  }

  let message_id = format!("mail_{}", uuid::Uuid::new_v4());
  info!(
    %to, %from, %subject,
    body_len = body.len(),
    %message_id,
    "Mail handed to outbound queue."
  );

  Ok(SentMail {
    to: to.to_string(),
    subject: subject.to_string(),
    message_id,
  })
}
