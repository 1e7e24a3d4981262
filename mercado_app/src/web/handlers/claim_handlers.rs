// mercado_app/src/web/handlers/claim_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ClaimType;
use crate::pipelines::{claim_open_pipeline, claim_refund_pipeline, claim_resolution_pipeline, mediation_pipeline};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenClaimPayload {
  pub claim_type: ClaimType,
  pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediationPayload {
  pub note: Option<String>,
}

#[instrument(name = "handler::open_claim", skip(app_state, caller, path, body), fields(order_id = %path.as_ref()))]
pub async fn open_claim_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
  body: web::Json<OpenClaimPayload>,
) -> Result<HttpResponse, AppError> {
  let claim =
    claim_open_pipeline::run_open_claim(&app_state, caller.0, path.into_inner(), body.claim_type, &body.description)
      .await?;
  Ok(HttpResponse::Created().json(json!({ "message": "Claim opened.", "claim": claim })))
}

#[instrument(name = "handler::refund", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn refund_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let result = claim_refund_pipeline::run_resolve_claim_refund(&app_state, caller.0, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(result))
}

#[instrument(name = "handler::admin_close_claim", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn admin_close_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let claim =
    claim_resolution_pipeline::run_resolve_claim_admin_close(&app_state, caller.0, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Claim closed.", "claim": claim })))
}

#[instrument(name = "handler::withdraw_claim", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn withdraw_claim_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let claim = claim_resolution_pipeline::run_cancel_own_claim(&app_state, caller.0, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Claim withdrawn.", "claim": claim })))
}

#[instrument(name = "handler::mediation", skip(app_state, caller, path, body), fields(order_id = %path.as_ref()))]
pub async fn mediation_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
  body: Option<web::Json<MediationPayload>>,
) -> Result<HttpResponse, AppError> {
  let note = body.and_then(|b| b.into_inner().note);
  let claim = mediation_pipeline::run_request_mediation(&app_state, caller.0, path.into_inner(), note).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Mediation requested.", "claim": claim })))
}
