// mercado_app/src/pipelines/dispatch_pipeline.rs

//! Courier assignment and the start of the delivery route. These are the only
//! transitions that move a delivery order to `ASSIGNED` and `ON_WAY`.

use crate::db::{self, orders, users};
use crate::errors::{AppError, Result};
use crate::models::{Actor, DeliveryStatus, Order, OrderStatus, Role, Severity};
use crate::pipelines::common_steps::{self, loaded};
use crate::pipelines::contexts::{AssignCourierCtxData, StartRouteCtxData};
use crate::pipelines::expect_completed;
use crate::services::notifier::NewNotification;
use crate::services::order_thread;
use crate::state::AppState;
use chrono::Utc;
use mercado_flow::{Flow, FlowData, FlowRegistry, StepControl, StepDef};
use sqlx::SqlitePool;
use tracing::{info, instrument};
use uuid::Uuid;

async fn load_delivery_order(pool: &SqlitePool, order_id: Uuid) -> Result<Order> {
  sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1 AND delivery_method = 'DELIVERY'")
    .bind(order_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Delivery order {} not found", order_id)))
}

fn dispatch_refusal(order: &Order) -> AppError {
  match (order.status, order.delivery_status) {
    (OrderStatus::Cancelled, _) => AppError::AlreadyFinal,
    (_, DeliveryStatus::Delivered) => AppError::AlreadyDelivered,
    (_, DeliveryStatus::OnWay) => AppError::Conflict("The courier is already on the way".to_string()),
    (_, DeliveryStatus::Pending) => AppError::Conflict("No courier is assigned to this order yet".to_string()),
    (_, DeliveryStatus::Assigned) => AppError::Conflict("The order changed during dispatch".to_string()),
  }
}

// --- Assign courier ---

pub fn register_assign_courier_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<AssignCourierCtxData, AppError>::new(&[
    StepDef::required("authorize_dispatcher"),
    StepDef::required("load_delivery_order"),
    StepDef::required("verify_courier_account"),
    StepDef::required("assign_courier"),
    StepDef::side_effect("notify_parties"),
  ]);

  p.on_step("authorize_dispatcher", |data: FlowData<AssignCourierCtxData>| {
    Box::pin(async move {
      let role = data.read().actor.role;
      if !matches!(role, Role::LogisticsAdmin | Role::Admin) {
        return Err(AppError::Forbidden("Only logistics staff can assign couriers".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("load_delivery_order", |data: FlowData<AssignCourierCtxData>| {
    Box::pin(async move {
      let (pool, order_id) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.order_id)
      };
      let order = load_delivery_order(&pool, order_id).await?;
      data.write().order = Some(order);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("verify_courier_account", |data: FlowData<AssignCourierCtxData>| {
    Box::pin(async move {
      let (pool, courier_id) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.courier_id)
      };
      match users::find_user(&pool, courier_id).await? {
        Some(user) if user.role == Role::Driver => Ok::<_, AppError>(StepControl::Continue),
        Some(_) => Err(AppError::Validation(format!("User {} is not a courier", courier_id))),
        None => Err(AppError::NotFound(format!("Courier {} not found", courier_id))),
      }
    })
  });

  p.on_step("assign_courier", assign_courier);
  p.on_step("notify_parties", common_steps::deliver_notifications::<AssignCourierCtxData>);

  registry.register(p);
}

#[instrument(name = "dispatch::assign_courier", skip(data), err)]
async fn assign_courier(data: FlowData<AssignCourierCtxData>) -> Result<StepControl> {
  let (pool, config, order, courier_id) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
      guard.courier_id,
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET courier_id = ?1, delivery_status = 'ASSIGNED', updated_at = ?2 \
     WHERE id = ?3 AND delivery_status IN ('PENDING', 'ASSIGNED') AND status <> 'CANCELLED'",
  )
  .bind(courier_id)
  .bind(Utc::now())
  .bind(order.id)
  .execute(&mut *tx)
  .await?;

  if result.rows_affected() == 0 {
    let current = orders::fetch_order(&mut *tx, order.id).await?;
    return Err(dispatch_refusal(&current));
  }

  order_thread::append_system_message(&mut *tx, order.id, "A courier has been assigned to this order.").await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, %courier_id, "Courier assigned.");

  let link = config.order_link(order.id);
  let mut guard = data.write();
  guard.order = Some(updated);
  guard.outbox.push(
    NewNotification::new(courier_id, "New delivery", "You have been assigned a delivery.", Severity::Info)
      .with_link(link.clone()),
  );
  if let Some(buyer) = order.user_id {
    guard.outbox.push(
      NewNotification::new(buyer, "Courier assigned", "A courier will deliver your order soon.", Severity::Info)
        .with_link(link),
    );
  }
  Ok(StepControl::Continue)
}

#[instrument(name = "dispatch::assign::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_assign_courier(state: &AppState, actor: Actor, order_id: Uuid, courier_id: Uuid) -> Result<Order> {
  let data = FlowData::new(AssignCourierCtxData::new(state.clone(), actor, order_id, courier_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "assign courier")?;
  let order = loaded(&data.read().order)?;
  Ok(order.redacted())
}

// --- Start route ---

pub fn register_start_route_flow(registry: &FlowRegistry<AppError>) {
  let mut p = Flow::<StartRouteCtxData, AppError>::new(&[
    StepDef::required("load_delivery_order"),
    StepDef::required("authorize_courier"),
    StepDef::required("mark_on_way"),
    StepDef::side_effect("notify_buyer"),
  ]);

  p.on_step("load_delivery_order", |data: FlowData<StartRouteCtxData>| {
    Box::pin(async move {
      let (pool, order_id) = {
        let guard = data.read();
        (guard.app_state.db_pool.clone(), guard.order_id)
      };
      let order = load_delivery_order(&pool, order_id).await?;
      data.write().order = Some(order);
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  // The assigned courier, or logistics staff acting for them.
  p.on_step("authorize_courier", |data: FlowData<StartRouteCtxData>| {
    Box::pin(async move {
      let guard = data.read();
      let order = loaded(&guard.order)?;
      let is_assigned = order.courier_id == Some(guard.actor.id);
      if !(is_assigned || matches!(guard.actor.role, Role::LogisticsAdmin | Role::Admin)) {
        return Err(AppError::Forbidden("Only the assigned courier can start this route".to_string()));
      }
      Ok::<_, AppError>(StepControl::Continue)
    })
  });

  p.on_step("mark_on_way", mark_on_way);
  p.on_step("notify_buyer", common_steps::deliver_notifications::<StartRouteCtxData>);

  registry.register(p);
}

#[instrument(name = "dispatch::mark_on_way", skip(data), err)]
async fn mark_on_way(data: FlowData<StartRouteCtxData>) -> Result<StepControl> {
  let (pool, config, order) = {
    let guard = data.read();
    (
      guard.app_state.db_pool.clone(),
      guard.app_state.config.clone(),
      loaded(&guard.order)?,
    )
  };

  let mut tx = db::begin_write(&pool).await?;
  let result = sqlx::query(
    "UPDATE orders SET delivery_status = 'ON_WAY', updated_at = ?1 \
     WHERE id = ?2 AND delivery_status = 'ASSIGNED' AND status <> 'CANCELLED'",
  )
  .bind(Utc::now())
  .bind(order.id)
  .execute(&mut *tx)
  .await?;

  if result.rows_affected() == 0 {
    let current = orders::fetch_order(&mut *tx, order.id).await?;
    return Err(dispatch_refusal(&current));
  }

  order_thread::append_system_message(&mut *tx, order.id, "The courier is on the way.").await?;
  let updated = orders::fetch_order(&mut *tx, order.id).await?;
  tx.commit().await?;

  info!(order_id = %order.id, "Delivery route started.");

  let mut guard = data.write();
  guard.order = Some(updated);
  if let Some(buyer) = order.user_id {
    guard.outbox.push(
      NewNotification::new(buyer, "On the way", "Your order is on its way.", Severity::Info)
        .with_link(config.order_link(order.id)),
    );
  }
  Ok(StepControl::Continue)
}

#[instrument(name = "dispatch::start_route::run", skip(state), fields(actor_id = %actor.id))]
pub async fn run_start_route(state: &AppState, actor: Actor, order_id: Uuid) -> Result<Order> {
  let data = FlowData::new(StartRouteCtxData::new(state.clone(), actor, order_id));
  let outcome = state.flows.run(data.clone()).await?;
  expect_completed(outcome, "start route")?;
  let order = loaded(&data.read().order)?;
  Ok(order.redacted())
}
