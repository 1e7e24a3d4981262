// mercado_app/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::pipelines::checkout_pipeline::run_checkout;
use crate::pipelines::contexts::CheckoutRequest;
use crate::state::AppState;
use crate::web::extractors::MaybeActor;

#[instrument(name = "handler::checkout", skip(app_state, caller, body), fields(lines = body.items.len()))]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  caller: MaybeActor,
  body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
  let buyer_id = caller.0.map(|a| a.id);
  let receipt = run_checkout(app_state.get_ref(), buyer_id, body.into_inner()).await?;
  info!(orders = receipt.orders.len(), total = receipt.grand_total_cents, "Checkout completed.");
  Ok(HttpResponse::Created().json(receipt))
}
