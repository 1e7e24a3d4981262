// mercado_app/src/web/handlers/scan_handlers.rs

use actix_web::{web, HttpResponse};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::contexts::ProofPhoto;
use crate::pipelines::{courier_scan_pipeline, pickup_scan_pipeline};
use crate::services::geo::GeoPoint;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupScanPayload {
  pub code: String,
  pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryScanPayload {
  pub order_id: Uuid,
  pub keywords: String,
  /// Base64 image bytes.
  pub photo: Option<String>,
  pub photo_content_type: Option<String>,
  pub location: Option<GeoPoint>,
}

impl DeliveryScanPayload {
  fn decode_proof(&self) -> Result<Option<ProofPhoto>, AppError> {
    let Some(encoded) = self.photo.as_deref().filter(|p| !p.trim().is_empty()) else {
      return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
      .decode(encoded.trim())
      .map_err(|e| AppError::Validation(format!("Photo is not valid base64: {}", e)))?;
    let content_type = self
      .photo_content_type
      .clone()
      .unwrap_or_else(|| "image/jpeg".to_string());
    Ok(Some(ProofPhoto { bytes, content_type }))
  }
}

#[instrument(name = "handler::pickup_scan", skip(app_state, caller, body), fields(actor_id = %caller.0.id))]
pub async fn pickup_scan_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  body: web::Json<PickupScanPayload>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let order = pickup_scan_pipeline::run_pickup_scan(&app_state, caller.0, &body.code, body.location).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Order delivered. Funds released.", "order": order })))
}

#[instrument(name = "handler::delivery_scan", skip(app_state, caller, body), fields(actor_id = %caller.0.id, order_id = %body.order_id))]
pub async fn delivery_scan_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  body: web::Json<DeliveryScanPayload>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let proof = body.decode_proof()?;
  let order = courier_scan_pipeline::run_courier_scan(
    &app_state,
    caller.0,
    body.order_id,
    &body.keywords,
    proof,
    body.location,
  )
  .await?;
  Ok(HttpResponse::Ok().json(json!({
    "message": "Delivery recorded. Funds are on hold.",
    "fundsReleaseAt": order.funds_release_at,
    "geoFlagged": order.geo_flagged,
    "order": order,
  })))
}
