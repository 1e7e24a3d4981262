// mercado_app/src/web/handlers/reputation_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::review_pipeline;
use crate::services::reputation;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
  pub rating: i64,
  pub comment: Option<String>,
}

#[instrument(name = "handler::add_review", skip(app_state, caller, path, body), fields(product_id = %path.as_ref()))]
pub async fn add_review_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
  body: web::Json<ReviewPayload>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let review = review_pipeline::run_add_review(&app_state, caller.0, path.into_inner(), body.rating, body.comment).await?;
  Ok(HttpResponse::Created().json(json!({ "message": "Review added.", "review": review })))
}

/// Staff, or the seller themselves, may force a recompute.
#[instrument(name = "handler::recompute_reputation", skip(app_state, caller, path), fields(seller_id = %path.as_ref()))]
pub async fn recompute_reputation_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let seller_id = path.into_inner();
  if !(caller.0.is_admin() || caller.0.id == seller_id) {
    return Err(AppError::Forbidden("You cannot recompute this seller's reputation".to_string()));
  }
  let mut conn = app_state.db_pool.acquire().await?;
  let result = reputation::recompute(&mut *conn, seller_id).await?;
  Ok(HttpResponse::Ok().json(result))
}
