// tests/claims_tests.rs
mod common;

use chrono::Utc;
use common::*;
use mercado_app::errors::AppError;
use mercado_app::models::{ClaimStatus, ClaimType, DeliveryMethod, OrderStatus, RefundStatus, Role};
use mercado_app::pipelines::cancellation_pipeline::run_cancel_order;
use mercado_app::pipelines::claim_open_pipeline::run_open_claim;
use mercado_app::pipelines::claim_refund_pipeline::run_resolve_claim_refund;
use mercado_app::pipelines::claim_resolution_pipeline::{run_cancel_own_claim, run_resolve_claim_admin_close};
use mercado_app::pipelines::courier_scan_pipeline::run_courier_scan;
use mercado_app::pipelines::fund_release_pipeline::run_release_due_funds;
use mercado_app::pipelines::mediation_pipeline::run_request_mediation;
use mercado_app::services::order_thread;

#[tokio::test]
async fn opening_a_claim_disputes_the_order() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  let claim = run_open_claim(
    &env.state,
    buyer,
    placed.order_id,
    ClaimType::NotReceived,
    "  The store was closed when I arrived.  ",
  )
  .await
  .unwrap();

  assert_eq!(claim.status, ClaimStatus::Open);
  assert_eq!(claim.user_id, buyer.id);
  assert_eq!(claim.description, "The store was closed when I arrived.");
  assert_eq!(order_row(&env.state, placed.order_id).await.status, OrderStatus::Disputed);
  assert!(env.notifier.for_user(seller.id).iter().any(|n| n.title == "Claim opened"));

  let thread = order_thread::list_messages(&env.state.db_pool, placed.order_id).await.unwrap();
  assert!(thread.iter().all(|m| m.is_system));
  assert!(thread.len() >= 2);
  assert!(thread
    .iter()
    .any(|m| m.body == "The buyer opened a claim (NOT_RECEIVED): The store was closed when I arrived."));
}

#[tokio::test]
async fn only_one_open_claim_per_order() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  let first = run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Damaged, "Box crushed")
    .await
    .unwrap();
  let err = run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Other, "Still waiting")
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::DuplicateOpenClaim));

  // After a withdrawal the same claim row is reopened.
  let withdrawn = run_cancel_own_claim(&env.state, buyer, placed.order_id).await.unwrap();
  assert_eq!(withdrawn.status, ClaimStatus::ResolvedReleased);

  let reopened = run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Other, "It happened again")
    .await
    .unwrap();
  assert_eq!(reopened.id, first.id);
  assert_eq!(reopened.status, ClaimStatus::Open);
  assert_eq!(reopened.claim_type, ClaimType::Other);

  let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims WHERE order_id = ?1 AND status = 'OPEN'")
    .bind(placed.order_id)
    .fetch_one(&env.state.db_pool)
    .await
    .unwrap();
  assert_eq!(open, 1);
}

#[tokio::test]
async fn claim_rules_reject_strangers_and_cancelled_orders() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  let err = run_open_claim(&env.state, seller, placed.order_id, ClaimType::Other, "hm")
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  let err = run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Other, "   ")
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));

  run_cancel_order(&env.state, buyer, placed.order_id, "no longer needed").await.unwrap();
  let err = run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Other, "refund me")
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::AlreadyFinal));
}

#[tokio::test]
async fn refund_resolves_the_claim_and_cancels_the_order() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;
  run_open_claim(&env.state, buyer, placed.order_id, ClaimType::NotReceived, "Never got it")
    .await
    .unwrap();

  let err = run_resolve_claim_refund(&env.state, buyer, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  let result = run_resolve_claim_refund(&env.state, seller, placed.order_id).await.unwrap();
  assert_eq!(result.order.status, OrderStatus::Cancelled);
  assert_eq!(result.order.refund_status, RefundStatus::Completed);
  assert_eq!(result.claims_resolved, 1);
  assert!(result.transcript_sent);

  let claim = mercado_app::db::claims::find_claim(&env.state.db_pool, placed.order_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(claim.status, ClaimStatus::ResolvedRefunded);
  assert!(env.notifier.for_user(buyer.id).iter().any(|n| n.title == "Refund issued"));

  let emails = env.notifier.emails.lock().unwrap().clone();
  assert_eq!(emails.len(), 1);
  assert!(emails[0].2.contains("Never got it"));

  let err = run_resolve_claim_refund(&env.state, seller, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn admin_close_leaves_the_order_alone() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let admin = seed_user(&env.state, Role::Admin).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  let err = run_resolve_claim_admin_close(&env.state, admin, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));

  run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Damaged, "Scratched")
    .await
    .unwrap();

  let err = run_resolve_claim_admin_close(&env.state, seller, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  let claim = run_resolve_claim_admin_close(&env.state, admin, placed.order_id).await.unwrap();
  assert_eq!(claim.status, ClaimStatus::ResolvedReleased);

  let order = order_row(&env.state, placed.order_id).await;
  assert_eq!(order.status, OrderStatus::Disputed);
  assert_eq!(order.refund_status, RefundStatus::None);
  assert!(!order.funds_released);
}

#[tokio::test]
async fn withdrawal_is_reserved_to_the_claimant() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  let err = run_cancel_own_claim(&env.state, buyer, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));

  run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Other, "Wrong colour")
    .await
    .unwrap();
  let err = run_cancel_own_claim(&env.state, seller, placed.order_id).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)));

  run_cancel_own_claim(&env.state, buyer, placed.order_id).await.unwrap();
  assert!(env.notifier.for_user(seller.id).iter().any(|n| n.title == "Claim withdrawn"));
}

#[tokio::test]
async fn open_claim_freezes_held_funds_until_it_is_closed() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let admin = seed_user(&env.state, Role::Admin).await;
  let courier = seed_user(&env.state, Role::Driver).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Delivery).await;
  let keywords = placed.security_keywords.clone().unwrap();

  run_courier_scan(&env.state, courier, placed.order_id, &keywords, Some(photo()), None)
    .await
    .unwrap();
  run_open_claim(&env.state, buyer, placed.order_id, ClaimType::Damaged, "Arrived broken")
    .await
    .unwrap();
  expire_hold(&env.state, placed.order_id).await;

  assert!(run_release_due_funds(&env.state, Utc::now()).await.unwrap().is_empty());
  assert!(!order_row(&env.state, placed.order_id).await.funds_released);

  run_resolve_claim_admin_close(&env.state, admin, placed.order_id).await.unwrap();
  assert_eq!(
    run_release_due_funds(&env.state, Utc::now()).await.unwrap(),
    vec![placed.order_id]
  );
  assert!(order_row(&env.state, placed.order_id).await.funds_released);
}

#[tokio::test]
async fn buyer_mediation_opens_a_claim_when_none_exists() {
  let env = setup().await;
  let seller = seed_user(&env.state, Role::User).await;
  let buyer = seed_user(&env.state, Role::User).await;
  let product = seed_product(&env.state, &seller, 1_000, 3).await;
  let placed = place_order(&env.state, &buyer, product, 1, DeliveryMethod::Pickup).await;

  // The seller has nothing to escalate yet.
  let err = run_request_mediation(&env.state, seller, placed.order_id, None).await.unwrap_err();
  assert!(matches!(err, AppError::NotFound(_)));

  let claim = run_request_mediation(&env.state, buyer, placed.order_id, Some("Seller stopped answering".into()))
    .await
    .unwrap();
  assert_eq!(claim.claim_type, ClaimType::Other);
  assert_eq!(claim.status, ClaimStatus::Open);

  let order = order_row(&env.state, placed.order_id).await;
  assert!(order.mediation_requested);
  assert_eq!(order.status, OrderStatus::Disputed);
  assert!(env.notifier.for_user(seller.id).iter().any(|n| n.title == "Mediation requested"));

  // Now the seller can escalate the same claim.
  let same = run_request_mediation(&env.state, seller, placed.order_id, None).await.unwrap();
  assert_eq!(same.id, claim.id);
  assert_eq!(same.status, ClaimStatus::Open);
}
