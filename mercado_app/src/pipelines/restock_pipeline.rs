// mercado_app/src/pipelines/restock_pipeline.rs

use crate::db::{self, orders};
use crate::errors::{AppError, Result};
use crate::models::{Actor, OrderStatus, Severity};
use crate::pipelines::common_steps::{self, loaded, require_seller_or_admin};
use crate::pipelines::contexts::RestockCtxData;
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::{inventory, order_thread};
use crate::state::AppState;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockedLine {
  pub product_id: Uuid,
  pub quantity: i64,
}

pub fn register_restock_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<RestockCtxData, AppError>::new(&[
    StepDef::required("load_order"),
    StepDef::required("authorize_seller"),
    StepDef::required("return_stock"),
    StepDef::side_effect("notify_seller"),
  ]);

  p.on_step("load_order", |data: FlowData<RestockCtxData>| {
    Box::pin(async move {
      let (pool, order_id) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.order_id)
      };
      let order = orders::fetch_order(&pool, order_id).await?;
      data.write().order = Some(order);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("authorize_seller", |data: FlowData<RestockCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      let order = loaded(&guard.order)?;
      require_seller_or_admin(&order, &guard.actor)?;
      if order.status != OrderStatus::Cancelled {
        return Err(AppError::Conflict("Only cancelled orders can return stock".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("return_stock", return_stock);
  p.on_step("notify_seller", common_steps::deliver_notifications::<RestockCtxData>);

  registry.register(p);
}

#[instrument(name = "restock::return_stock", skip(data), err)]
async fn return_stock(data: FlowData<RestockCtxData>) -> Result<StepControl> {
  let (pool, config, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let restored = inventory::restore_order_stock(&mut *tx, order.id).await?;
  order_thread::append_system_message(&mut *tx, order.id, "Items returned to inventory.").await?;
  tx.commit().await?;

  info!(order_id = %order.id, lines = restored.len(), "Stock restored for cancelled order.");

  let mut guard = data.write();
  guard.restored = restored;
  guard.outbox.push(
    NewNotification::new(
      order.seller_id,
      "Stock restored",
      "The items of a cancelled order are back in your inventory.",
      Severity::Info,
    )
    .with_link(config.order_link(order.id)),
  );
  Ok(StepControl::Continue)
}

/// Returns a cancelled order's quantities to inventory, at most once.
#[instrument(name = "restock::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_unpause_order_stock(state: &AppState, actor: Actor, order_id: Uuid) -> Result<Vec<RestockedLine>> {
  let data = FlowData::new(RestockCtxData::new(state.clone(), actor, order_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "restock")?;
  let lines = data
    .read()
    .restored
    .iter()
    .map(|(product_id, quantity)| RestockedLine {
      product_id: *product_id,
      quantity: *quantity,
    })
    .collect();
  Ok(lines)
}
