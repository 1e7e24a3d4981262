// mercado_app/src/services/reputation.rs

use crate::errors::{AppError, Result};
use crate::models::ReputationTier;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const BASE_POINTS: f64 = 20.0;
const MAX_SALES_POINTS: i64 = 30;
const MAX_RATING_POINTS: f64 = 40.0;
const VERIFIED_POINTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReputationInputs {
  /// Order lines of fulfilled orders containing the seller's products.
  pub completed_sales: i64,
  /// Mean rating over all reviews of the seller's products, `None` if unreviewed.
  pub average_rating: Option<f64>,
  pub is_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
  pub score: i64,
  pub tier: ReputationTier,
}

pub fn compute_score(inputs: &ReputationInputs) -> i64 {
  let mut score = BASE_POINTS + inputs.completed_sales.clamp(0, MAX_SALES_POINTS) as f64;
  if let Some(avg) = inputs.average_rating {
    score += (avg / 5.0) * MAX_RATING_POINTS;
  }
  if inputs.is_verified {
    score += VERIFIED_POINTS;
  }
  score.clamp(0.0, 100.0).round() as i64
}

pub fn tier_for(score: i64) -> ReputationTier {
  match score {
    s if s >= 95 => ReputationTier::Platinum,
    s if s >= 80 => ReputationTier::Verde,
    s if s >= 50 => ReputationTier::Amarillo,
    s if s >= 20 => ReputationTier::Naranja,
    _ => ReputationTier::Rojo,
  }
}

/// Re-derives a seller's score from current data and persists it.
///
/// Pure function of the data, so calling it twice in a row gives the same
/// answer.
#[instrument(skip(conn))]
pub async fn recompute(conn: &mut SqliteConnection, seller_id: Uuid) -> Result<Reputation> {
  let is_verified = sqlx::query_scalar::<_, bool>("SELECT is_verified FROM users WHERE id = ?1")
    .bind(seller_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Seller {} not found", seller_id)))?;

  let completed_sales = sqlx::query_scalar::<_, i64>(
    "SELECT COUNT(*) FROM order_items oi \
     JOIN orders o ON o.id = oi.order_id \
     JOIN products p ON p.id = oi.product_id \
     WHERE p.seller_id = ?1 AND o.status = 'FULFILLED'",
  )
  .bind(seller_id)
  .fetch_one(&mut *conn)
  .await?;

  let average_rating = sqlx::query_scalar::<_, Option<f64>>(
    "SELECT AVG(CAST(r.rating AS REAL)) FROM reviews r JOIN products p ON p.id = r.product_id WHERE p.seller_id = ?1",
  )
  .bind(seller_id)
  .fetch_one(&mut *conn)
  .await?;

  let inputs = ReputationInputs {
    completed_sales,
    average_rating,
    is_verified,
  };
  let score = compute_score(&inputs);
  let tier = tier_for(score);

  sqlx::query("UPDATE users SET reputation_score = ?1, reputation_tier = ?2 WHERE id = ?3")
    .bind(score)
    .bind(tier)
    .bind(seller_id)
    .execute(&mut *conn)
    .await?;

  info!(%seller_id, completed_sales, ?average_rating, score, ?tier, "Reputation recomputed.");
  Ok(Reputation { score, tier })
}
