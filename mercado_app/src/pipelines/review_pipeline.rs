// mercado_app/src/pipelines/review_pipeline.rs

use crate::db::users;
use crate::errors::{AppError, Result};
use crate::models::{Actor, Product, Review};
use crate::pipelines::common_steps::{self, required_text};
use crate::pipelines::contexts::ReviewCtxData;
use crate::pipelines::expect_completed;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use tracing::{info, instrument};
use uuid::Uuid;

const MAX_COMMENT_CHARS: usize = 2_000;

pub fn register_review_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<ReviewCtxData, AppError>::new(&[
    StepDef::required("validate_review"),
    StepDef::required("load_product"),
    StepDef::required("store_review"),
    StepDef::side_effect("refresh_seller_reputation"),
  ]);

  p.on_step("validate_review", |data: FlowData<ReviewCtxData>| {
    Box::pin(async move {
      let mut guard = data.write();
      if !(1..=5).contains(&guard.rating) {
        return Err(AppError::Validation("Rating must be between 1 and 5".to_string()));
      }
      let comment = match guard.comment.take() {
        Some(c) if c.trim().is_empty() => None,
        Some(c) => Some(required_text("Comment", &c, MAX_COMMENT_CHARS)?),
        None => None,
      };
      guard.comment = comment;
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("load_product", |data: FlowData<ReviewCtxData>| {
    Box::pin(async move {
      let (pool, product_id, actor) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.product_id, guard.actor)
      };
      let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
      if product.seller_id == actor.id {
        return Err(AppError::Forbidden("Sellers cannot review their own products".to_string()));
      }
      if users::find_user(&pool, actor.id).await?.is_none() {
        return Err(AppError::Auth(format!("Unknown user {}", actor.id)));
      }
      data.write().seller_id = Some(product.seller_id);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("store_review", store_review);
  p.on_step(
    "refresh_seller_reputation",
    common_steps::refresh_seller_reputation::<ReviewCtxData>,
  );

  registry.register(p);
}

#[instrument(name = "reviews::store", skip(data), err)]
async fn store_review(data: FlowData<ReviewCtxData>) -> Result<StepControl> {
  let (pool, product_id, actor, rating, comment) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.product_id,
      guard.actor,
      guard.rating,
      guard.comment.clone(),
    )
  };

  let review_id = Uuid::new_v4();
  sqlx::query(
    "INSERT INTO reviews (id, product_id, user_id, rating, comment, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )
  .bind(review_id)
  .bind(product_id)
  .bind(actor.id)
  .bind(rating)
  .bind(&comment)
  .bind(Utc::now())
  .execute(&pool)
  .await?;

  info!(%review_id, %product_id, rating, "Review stored.");
  data.write().review_id = Some(review_id);
  Ok(StepControl::Continue)
}

/// Stores a product review and refreshes the seller's reputation.
#[instrument(name = "reviews::run", skip(state, comment), fields(actor_id = %actor.id))]
pub async fn run_add_review(
  state: &AppState,
  actor: Actor,
  product_id: Uuid,
  rating: i64,
  comment: Option<String>,
) -> Result<Review> {
  let data = FlowData::new(ReviewCtxData::new(state.clone(), actor, product_id, rating, comment));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "review")?;

  let review_id = data
    .read()
    .review_id
    .ok_or_else(|| AppError::Internal("Review id missing after flow".to_string()))?;
  let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = ?1")
    .bind(review_id)
    .fetch_one(&state.db_pool)
    .await?;
  Ok(review)
}
