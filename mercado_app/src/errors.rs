// mercado_app/src/errors.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use mercado_flow::FlowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Insufficient stock for product '{product}'")]
  InsufficientStock { product: String },

  #[error("This order was already delivered")]
  AlreadyDelivered,

  #[error("Funds for this order were already released")]
  AlreadyReleased,

  #[error("The order is in transit and can no longer be cancelled")]
  TooLate,

  #[error("The order is already in a final state")]
  AlreadyFinal,

  #[error("An open claim already exists for this order")]
  DuplicateOpenClaim,

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Incorrect keywords, delivery cannot be validated")]
  KeywordMismatch,

  #[error("A proof-of-delivery photo is required")]
  MissingProof,

  #[error("Upload too large: {size} bytes (max {max})")]
  BlobTooLarge { size: usize, max: usize },

  #[error("Unsupported media type: {0}")]
  UnsupportedMedia(String),

  #[error("Blob storage error: {0}")]
  Blob(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl AppError {
  /// Errors that gate a funds-release decision; these get an audit record.
  pub fn is_security_failure(&self) -> bool {
    matches!(self, AppError::KeywordMismatch | AppError::MissingProof)
  }

  /// Short machine-readable code for API clients.
  pub fn code(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "validation",
      AppError::Auth(_) => "unauthenticated",
      AppError::Forbidden(_) => "forbidden",
      AppError::NotFound(_) => "not_found",
      AppError::InsufficientStock { .. } => "insufficient_stock",
      AppError::AlreadyDelivered => "already_delivered",
      AppError::AlreadyReleased => "already_released",
      AppError::TooLate => "in_transit",
      AppError::AlreadyFinal => "already_final",
      AppError::DuplicateOpenClaim => "duplicate_open_claim",
      AppError::Conflict(_) => "conflict",
      AppError::KeywordMismatch => "keyword_mismatch",
      AppError::MissingProof => "missing_proof",
      AppError::BlobTooLarge { .. } => "payload_too_large",
      AppError::UnsupportedMedia(_) => "unsupported_media",
      AppError::Blob(_)
      | AppError::Config(_)
      | AppError::Sqlx(_)
      | AppError::Migrate(_)
      | AppError::Workflow { .. }
      | AppError::Internal(_) => "internal",
    }
  }

  /// Plain-language message shown to the user; internal detail never leaks.
  fn public_message(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::Auth(m) | AppError::Forbidden(m) | AppError::NotFound(m) => m.clone(),
      AppError::Conflict(m) => m.clone(),
      AppError::Blob(_)
      | AppError::Config(_)
      | AppError::Sqlx(_)
      | AppError::Migrate(_)
      | AppError::Workflow { .. }
      | AppError::Internal(_) => "An internal error occurred".to_string(),
      other => other.to_string(),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::MissingProof => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) | AppError::KeywordMismatch => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::InsufficientStock { .. }
      | AppError::AlreadyDelivered
      | AppError::AlreadyReleased
      | AppError::TooLate
      | AppError::AlreadyFinal
      | AppError::DuplicateOpenClaim
      | AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::BlobTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
      AppError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
      AppError::Blob(_)
      | AppError::Config(_)
      | AppError::Sqlx(_)
      | AppError::Migrate(_)
      | AppError::Workflow { .. }
      | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::info!(application_error = %self, code = self.code(), "Rejecting request");
    }
    HttpResponse::build(status).json(json!({"error": self.public_message(), "code": self.code()}))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
