// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use mercado_app::config::AppConfig;
use mercado_app::db;
use mercado_app::errors::{AppError, Result};
use mercado_app::models::{Actor, DeliveryMethod, Order, PaymentMethod, Role};
use mercado_app::pipelines::checkout_pipeline::run_checkout;
use mercado_app::pipelines::contexts::{CheckoutItem, CheckoutRequest, PlacedOrder, ProofPhoto, ShippingDetails};
use mercado_app::services::geo::GeoPoint;
use mercado_app::services::notifier::{NewNotification, Notifier};
use mercado_app::state::AppState;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::Level;
use uuid::Uuid;

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

/// Keeps everything a flow sends so tests can assert on it.
#[derive(Default)]
pub struct RecordingNotifier {
  pub notifications: Mutex<Vec<NewNotification>>,
  pub emails: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
  pub fn for_user(&self, user_id: Uuid) -> Vec<NewNotification> {
    self
      .notifications
      .lock()
      .unwrap()
      .iter()
      .filter(|n| n.user_id == user_id)
      .cloned()
      .collect()
  }

  pub fn email_count(&self) -> usize {
    self.emails.lock().unwrap().len()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn notify(&self, notification: NewNotification) -> Result<()> {
    self.notifications.lock().unwrap().push(notification);
    Ok(())
  }

  async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
    self
      .emails
      .lock()
      .unwrap()
      .push((to.to_string(), subject.to_string(), body.to_string()));
    Ok(())
  }
}

/// A notification channel that is always down.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
  async fn notify(&self, _notification: NewNotification) -> Result<()> {
    Err(AppError::Internal("notification service unavailable".to_string()))
  }

  async fn send_email(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
    Err(AppError::Internal("mail relay unavailable".to_string()))
  }
}

pub struct TestEnv {
  pub state: AppState,
  pub notifier: Arc<RecordingNotifier>,
  _dir: TempDir,
}

async fn build_state(dir: &TempDir, notifier: Arc<dyn Notifier>) -> AppState {
  let db_url = format!("sqlite://{}", dir.path().join("mercado-test.db").display());
  let config = AppConfig::with_defaults(db_url.clone(), dir.path().join("blobs"));
  let pool = db::connect(&db_url, 4).await.expect("database should open");
  AppState::build(config, pool, notifier).await.expect("state should build")
}

pub async fn setup() -> TestEnv {
  setup_tracing();
  let dir = tempfile::tempdir().expect("tempdir");
  let notifier = Arc::new(RecordingNotifier::default());
  let state = build_state(&dir, notifier.clone()).await;
  TestEnv {
    state,
    notifier,
    _dir: dir,
  }
}

/// Same as [`setup`], but every notification and email fails.
pub async fn setup_with_failing_notifier() -> (AppState, TempDir) {
  setup_tracing();
  let dir = tempfile::tempdir().expect("tempdir");
  let state = build_state(&dir, Arc::new(FailingNotifier)).await;
  (state, dir)
}

pub async fn seed_user(state: &AppState, role: Role) -> Actor {
  seed_user_verified(state, role, false).await
}

pub async fn seed_user_verified(state: &AppState, role: Role, verified: bool) -> Actor {
  let email = format!("{}@mercado.test", Uuid::new_v4().simple());
  let id = db::users::insert_user(&state.db_pool, &email, role, verified)
    .await
    .expect("insert user");
  Actor::new(id, role)
}

pub async fn seed_product(state: &AppState, seller: &Actor, price_cents: i64, stock: i64) -> Uuid {
  db::users::insert_product(&state.db_pool, seller.id, "Yerba mate 1kg", price_cents, stock)
    .await
    .expect("insert product")
}

pub fn shipping() -> ShippingDetails {
  ShippingDetails {
    name: "Lucia Fernandez".to_string(),
    phone: "+54 11 5555 0101".to_string(),
    address: Some("Av. Corrientes 1234, CABA".to_string()),
    location: Some(GeoPoint::new(-34.6037, -58.3816)),
  }
}

pub fn request(items: &[(Uuid, i64)], delivery: DeliveryMethod, payment: PaymentMethod) -> CheckoutRequest {
  CheckoutRequest {
    items: items
      .iter()
      .map(|(product_id, quantity)| CheckoutItem {
        product_id: *product_id,
        quantity: *quantity,
      })
      .collect(),
    shipping: shipping(),
    payment_method: payment,
    delivery_method: delivery,
  }
}

/// Checks out a single line and returns the only order created.
pub async fn place_order(
  state: &AppState,
  buyer: &Actor,
  product_id: Uuid,
  quantity: i64,
  delivery: DeliveryMethod,
) -> PlacedOrder {
  let receipt = run_checkout(
    state,
    Some(buyer.id),
    request(&[(product_id, quantity)], delivery, PaymentMethod::Card),
  )
  .await
  .expect("checkout should succeed");
  assert_eq!(receipt.orders.len(), 1);
  receipt.orders.into_iter().next().expect("one order")
}

pub async fn order_row(state: &AppState, order_id: Uuid) -> Order {
  db::orders::fetch_order(&state.db_pool, order_id).await.expect("order row")
}

pub async fn stock_of(state: &AppState, product_id: Uuid) -> (i64, bool) {
  sqlx::query_as::<_, (i64, bool)>("SELECT stock, is_active FROM products WHERE id = ?1")
    .bind(product_id)
    .fetch_one(&state.db_pool)
    .await
    .expect("product row")
}

pub async fn verification_attempts(state: &AppState, order_id: Uuid) -> Vec<String> {
  sqlx::query_scalar::<_, String>("SELECT reason FROM verification_attempts WHERE order_id = ?1")
    .bind(order_id)
    .fetch_all(&state.db_pool)
    .await
    .expect("attempt rows")
}

pub fn photo() -> ProofPhoto {
  ProofPhoto {
    bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'],
    content_type: "image/jpeg".to_string(),
  }
}

/// Drops the holding window to the past so the sweeper picks the order up.
pub async fn expire_hold(state: &AppState, order_id: Uuid) {
  sqlx::query("UPDATE orders SET funds_release_at = ?1 WHERE id = ?2")
    .bind(chrono::Utc::now() - chrono::Duration::hours(1))
    .bind(order_id)
    .execute(&state.db_pool)
    .await
    .expect("update hold");
}
