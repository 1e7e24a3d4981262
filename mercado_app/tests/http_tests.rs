// tests/http_tests.rs
mod common;

use actix_web::{http::StatusCode, test, web, App};
use base64::Engine;
use common::*;
use mercado_app::models::{DeliveryMethod, Role};
use mercado_app::web::configure_app_routes;
use mercado_app::web::extractors::{USER_ID_HEADER, USER_ROLE_HEADER};
use serde_json::{json, Value};

macro_rules! app {
  ($state:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($state.clone()))
        .configure(configure_app_routes),
    )
    .await
  };
}

#[actix_web::test]
async fn health_endpoint_answers() {
  let env = setup().await;
  let app = app!(env.state);

  let req = test::TestRequest::get().uri("/api/v1/health").to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn protected_routes_require_an_identity() {
  let env = setup().await;
  let app = app!(env.state);

  let req = test::TestRequest::post()
    .uri("/api/v1/scan/pickup")
    .set_json(json!({ "code": "ABCD1234" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["code"], "unauthenticated");

  let req = test::TestRequest::post()
    .uri("/api/v1/scan/pickup")
    .insert_header((USER_ID_HEADER, "not-a-uuid"))
    .set_json(json!({ "code": "ABCD1234" }))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn checkout_then_pickup_over_http() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_250, 2).await;
  let app = app!(env.state);

  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header((USER_ID_HEADER, buyer.id.to_string()))
    .set_json(json!({
      "items": [{ "productId": product, "quantity": 2 }],
      "shipping": { "name": "Lucia", "phone": "1155550101" },
      "paymentMethod": "CARD",
      "deliveryMethod": "PICKUP"
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let receipt: Value = test::read_body_json(resp).await;
  assert_eq!(receipt["grandTotalCents"], 2_500);
  let order_id = receipt["orders"][0]["orderId"].as_str().unwrap().to_string();
  let code = receipt["orders"][0]["pickupCode"].as_str().unwrap().to_string();

  // Sold out now.
  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header((USER_ID_HEADER, buyer.id.to_string()))
    .set_json(json!({
      "items": [{ "productId": product, "quantity": 1 }],
      "shipping": { "name": "Lucia", "phone": "1155550101" },
      "paymentMethod": "CARD",
      "deliveryMethod": "PICKUP"
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["code"], "insufficient_stock");

  let req = test::TestRequest::post()
    .uri("/api/v1/scan/pickup")
    .insert_header((USER_ID_HEADER, seller.id.to_string()))
    .set_json(json!({ "code": code }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["order"]["fundsReleased"], true);
  assert!(body["order"]["pickupCode"].is_null());

  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/orders/{}", order_id))
    .insert_header((USER_ID_HEADER, buyer.id.to_string()))
    .to_request();
  let view: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(view["order"]["deliveryStatus"], "DELIVERED");
  assert_eq!(view["order"]["pickupCode"], code.as_str());
}

#[actix_web::test]
async fn delivery_scan_over_http_maps_security_failures() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let courier = seed_user(&env.state, Role::Driver).await;
  let product = seed_product(&env.state, &seller, 1_000, 2).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Delivery).await;
  let keywords = placed.security_keywords.clone().unwrap();
  let app = app!(env.state);

  let scan = |keywords: &str, photo: Option<String>| {
    test::TestRequest::post()
      .uri("/api/v1/scan/delivery")
      .insert_header((USER_ID_HEADER, courier.id.to_string()))
      .insert_header((USER_ROLE_HEADER, "DRIVER"))
      .set_json(json!({ "orderId": placed.order_id, "keywords": keywords, "photo": photo }))
      .to_request()
  };
  let encoded = base64::engine::general_purpose::STANDARD.encode(photo().bytes);

  let resp = test::call_service(&app, scan("nope-nope-nope", Some(encoded.clone()))).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);

  let resp = test::call_service(&app, scan(&keywords, None)).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = test::call_service(&app, scan(&keywords, Some("%%%".to_string()))).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = test::call_service(&app, scan(&keywords, Some(encoded.clone()))).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["order"]["fundsReleased"], false);
  assert!(body["order"]["fundsReleaseAt"].is_string());

  let resp = test::call_service(&app, scan(&keywords, Some(encoded))).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
}
