// mercado_app/src/web/extractors.rs

//! Caller identity. Sessions live in front of this service; it trusts the
//! `X-User-ID` and `X-User-Role` headers set by the gateway.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Actor, Role};

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

fn actor_from_headers(req: &HttpRequest) -> Result<Option<Actor>, AppError> {
  let Some(raw_id) = req.headers().get(USER_ID_HEADER) else {
    return Ok(None);
  };
  let id = raw_id
    .to_str()
    .ok()
    .and_then(|s| Uuid::parse_str(s.trim()).ok())
    .ok_or_else(|| AppError::Auth(format!("Invalid {} header", USER_ID_HEADER)))?;

  let role = match req.headers().get(USER_ROLE_HEADER) {
    None => Role::User,
    Some(raw_role) => raw_role
      .to_str()
      .map_err(|_| AppError::Auth(format!("Invalid {} header", USER_ROLE_HEADER)))?
      .parse::<Role>()
      .map_err(AppError::Auth)?,
  };
  Ok(Some(Actor::new(id, role)))
}

/// A caller that must be identified.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub Actor);

impl FromRequest for AuthenticatedActor {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = match actor_from_headers(req) {
      Ok(Some(actor)) => Ok(AuthenticatedActor(actor)),
      Ok(None) => {
        warn!("Request without {} header.", USER_ID_HEADER);
        Err(AppError::Auth("Authentication required".to_string()))
      }
      Err(e) => Err(e),
    };
    ready(result)
  }
}

/// A caller that may be a guest (checkout only).
#[derive(Debug, Clone, Copy)]
pub struct MaybeActor(pub Option<Actor>);

impl FromRequest for MaybeActor {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(actor_from_headers(req).map(MaybeActor))
  }
}
