// mercado_app/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{checkout_handlers, claim_handlers, order_handlers, reputation_handlers, scan_handlers};

/// Room for a base64 proof photo at the default size ceiling.
const JSON_BODY_LIMIT: usize = 8 * 1024 * 1024;

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .app_data(web::JsonConfig::default().limit(JSON_BODY_LIMIT))
      .route("/health", web::get().to(health_check_handler))
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler))
      .service(
        web::scope("/orders/{order_id}")
          .route("", web::get().to(order_handlers::get_order_handler))
          .route("/cancel", web::post().to(order_handlers::cancel_order_handler))
          .route("/confirm-receipt", web::post().to(order_handlers::confirm_receipt_handler))
          .route("/assign-courier", web::post().to(order_handlers::assign_courier_handler))
          .route("/start-route", web::post().to(order_handlers::start_route_handler))
          .route("/unpause-stock", web::post().to(order_handlers::unpause_stock_handler))
          .route("/claims", web::post().to(claim_handlers::open_claim_handler))
          .route("/claims/refund", web::post().to(claim_handlers::refund_handler))
          .route("/claims/close", web::post().to(claim_handlers::admin_close_handler))
          .route("/claims/cancel", web::post().to(claim_handlers::withdraw_claim_handler))
          .route("/claims/mediation", web::post().to(claim_handlers::mediation_handler)),
      )
      .service(
        web::scope("/scan")
          .route("/pickup", web::post().to(scan_handlers::pickup_scan_handler))
          .route("/delivery", web::post().to(scan_handlers::delivery_scan_handler)),
      )
      .route(
        "/products/{product_id}/reviews",
        web::post().to(reputation_handlers::add_review_handler),
      )
      .route(
        "/sellers/{seller_id}/reputation",
        web::post().to(reputation_handlers::recompute_reputation_handler),
      ),
  );
}
