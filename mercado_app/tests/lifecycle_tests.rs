// tests/lifecycle_tests.rs
mod common;

use common::*;
use mercado_app::errors::AppError;
use mercado_app::models::{DeliveryMethod, DeliveryStatus, OrderStatus, Role};
use mercado_app::pipelines::cancellation_pipeline::run_cancel_order;
use mercado_app::pipelines::claim_open_pipeline::run_open_claim;
use mercado_app::pipelines::courier_scan_pipeline::run_courier_scan;
use mercado_app::pipelines::dispatch_pipeline::{run_assign_courier, run_start_route};
use mercado_app::pipelines::pickup_scan_pipeline::run_pickup_scan;
use mercado_app::pipelines::receipt_pipeline::run_confirm_receipt;
use mercado_app::services::order_view::get_order;

#[tokio::test]
async fn buyer_can_cancel_until_the_courier_leaves() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let dispatcher = seed_user(&env.state, Role::LogisticsAdmin).await;
  let courier = seed_user(&env.state, Role::Driver).await;
  let product = seed_product(&env.state, &seller, 1_000, 5).await;

  // Assigned but not yet on the way: still cancellable.
  let early = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Delivery).await;
  run_assign_courier(&env.state, dispatcher, early.order_id, courier.id).await.unwrap();
  let cancelled = run_cancel_order(&env.state, buyer, early.order_id, "Ordered by mistake").await.unwrap();
  assert_eq!(cancelled.status, OrderStatus::Cancelled);
  assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Ordered by mistake"));
  assert!(env.notifier.for_user(seller.id).iter().any(|n| n.title == "Order cancelled"));

  let err = run_cancel_order(&env.state, buyer, early.order_id, "again").await.unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));

  // On the way: too late.
  let late = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Delivery).await;
  run_assign_courier(&env.state, dispatcher, late.order_id, courier.id).await.unwrap();
  run_start_route(&env.state, courier, late.order_id).await.unwrap();
  let err = run_cancel_order(&env.state, buyer, late.order_id, "Too slow").await.unwrap_err();
  assert!(matches!(err, AppError::TooLate));
  let row = order_row(&env.state, late.order_id).await;
  assert_eq!(row.status, OrderStatus::Paid);
  assert_eq!(row.delivery_status, DeliveryStatus::OnWay);
}

#[tokio::test]
async fn cancellation_needs_the_buyer_and_a_reason() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 5).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  let err = run_cancel_order(&env.state, buyer, placed.order_id, "   ").await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));

  let err = run_cancel_order(&env.state, seller, placed.order_id, "Out of stock").await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  let err = run_cancel_order(&env.state, buyer, uuid::Uuid::new_v4(), "Wrong order").await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delivered_and_disputed_orders_cannot_be_cancelled() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 5).await;

  let picked = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;
  run_pickup_scan(&env.state, seller, picked.pickup_code.as_deref().unwrap(), None)
    .await
    .unwrap();
  let err = run_cancel_order(&env.state, buyer, picked.order_id, "changed my mind").await.unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));

  let disputed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;
  run_open_claim(&env.state, buyer, disputed.order_id, mercado_app::models::ClaimType::Other, "Missing item")
    .await
    .unwrap();
  let err = run_cancel_order(&env.state, buyer, disputed.order_id, "changed my mind").await.unwrap_err();
  assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn cancelled_orders_never_reach_delivered() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let courier = seed_user(&env.state, Role::Driver).await;
  let dispatcher = seed_user(&env.state, Role::LogisticsAdmin).await;
  let product = seed_product(&env.state, &seller, 1_000, 5).await;

  let pickup = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;
  run_cancel_order(&env.state, buyer, pickup.order_id, "No longer needed").await.unwrap();
  let err = run_pickup_scan(&env.state, seller, pickup.pickup_code.as_deref().unwrap(), None)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));
  let err = run_confirm_receipt(&env.state, buyer, pickup.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));

  let delivery = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Delivery).await;
  run_cancel_order(&env.state, buyer, delivery.order_id, "No longer needed").await.unwrap();
  let keywords = delivery.security_keywords.clone().unwrap();
  let err = run_courier_scan(&env.state, courier, delivery.order_id, &keywords, Some(photo()), None)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));
  let err = run_assign_courier(&env.state, dispatcher, delivery.order_id, courier.id).await.unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));

  for id in [pickup.order_id, delivery.order_id] {
    let row = order_row(&env.state, id).await;
    assert_ne!(row.delivery_status, DeliveryStatus::Delivered);
    assert!(!row.funds_released);
  }
}

#[tokio::test]
async fn dispatch_is_limited_to_logistics_staff() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let dispatcher = seed_user(&env.state, Role::LogisticsAdmin).await;
  let courier = seed_user(&env.state, Role::Driver).await;
  let other_courier = seed_user(&env.state, Role::Driver).await;
  let product = seed_product(&env.state, &seller, 1_000, 5).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Delivery).await;

  let err = run_assign_courier(&env.state, seller, placed.order_id, courier.id).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  // The target account must be a driver.
  let err = run_assign_courier(&env.state, dispatcher, placed.order_id, buyer.id).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)), "{err}");

  // Starting the route needs an assignment first.
  let err = run_start_route(&env.state, courier, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)), "{err}");

  run_assign_courier(&env.state, dispatcher, placed.order_id, courier.id).await.unwrap();
  let err = run_start_route(&env.state, other_courier, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  // Reassignment is allowed while nobody has left yet.
  let reassigned = run_assign_courier(&env.state, dispatcher, placed.order_id, other_courier.id)
    .await
    .unwrap();
  assert_eq!(reassigned.courier_id, Some(other_courier.id));
  run_start_route(&env.state, other_courier, placed.order_id).await.unwrap();

  let err = run_assign_courier(&env.state, dispatcher, placed.order_id, courier.id).await.unwrap_err();
  assert!(matches!(err, AppError::Conflict(_)));
  assert!(env.notifier.for_user(buyer.id).len() >= 2);
}

#[tokio::test]
async fn order_view_hides_secrets_from_everyone_but_the_buyer() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let stranger = seed_user(&env.state, Role::User).await;
  let admin = seed_user(&env.state, Role::Admin).await;
  let product = seed_product(&env.state, &seller, 1_000, 5).await;
  let placed = place_order(&env.state, &buyer, product, 2, DeliveryMethod::Pickup).await;

  let mine = get_order(&env.state.db_pool, placed.order_id, &buyer).await.unwrap();
  assert_eq!(mine.order.pickup_code, placed.pickup_code);
  assert_eq!(mine.items.len(), 1);
  assert_eq!(mine.items[0].quantity, 2);
  assert!(mine.claim.is_none());
  assert!(!mine.messages.is_empty());

  let sellers = get_order(&env.state.db_pool, placed.order_id, &seller).await.unwrap();
  assert!(sellers.order.pickup_code.is_none());
  let admins = get_order(&env.state.db_pool, placed.order_id, &admin).await.unwrap();
  assert!(admins.order.pickup_code.is_none());

  let err = get_order(&env.state.db_pool, placed.order_id, &stranger).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));
}
