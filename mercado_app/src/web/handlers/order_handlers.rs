// mercado_app/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::{cancellation_pipeline, dispatch_pipeline, receipt_pipeline, restock_pipeline};
use crate::services::order_view;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

#[derive(Debug, Deserialize)]
pub struct CancelOrderPayload {
  pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignCourierPayload {
  pub courier_id: Uuid,
}

#[instrument(name = "handler::get_order", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let view = order_view::get_order(&app_state.db_pool, path.into_inner(), &caller.0).await?;
  Ok(HttpResponse::Ok().json(view))
}

#[instrument(name = "handler::cancel_order", skip(app_state, caller, path, body), fields(order_id = %path.as_ref()))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
  body: web::Json<CancelOrderPayload>,
) -> Result<HttpResponse, AppError> {
  let order = cancellation_pipeline::run_cancel_order(&app_state, caller.0, path.into_inner(), &body.reason).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Order cancelled.", "order": order })))
}

#[instrument(name = "handler::confirm_receipt", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn confirm_receipt_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = receipt_pipeline::run_confirm_receipt(&app_state, caller.0, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Receipt confirmed. Funds released.", "order": order })))
}

#[instrument(name = "handler::assign_courier", skip(app_state, caller, path, body), fields(order_id = %path.as_ref()))]
pub async fn assign_courier_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
  body: web::Json<AssignCourierPayload>,
) -> Result<HttpResponse, AppError> {
  let order = dispatch_pipeline::run_assign_courier(&app_state, caller.0, path.into_inner(), body.courier_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Courier assigned.", "order": order })))
}

#[instrument(name = "handler::start_route", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn start_route_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = dispatch_pipeline::run_start_route(&app_state, caller.0, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Route started.", "order": order })))
}

#[instrument(name = "handler::unpause_stock", skip(app_state, caller, path), fields(order_id = %path.as_ref()))]
pub async fn unpause_stock_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedActor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let lines = restock_pipeline::run_unpause_order_stock(&app_state, caller.0, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Stock restored.", "lines": lines })))
}
