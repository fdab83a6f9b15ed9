// apps/marketplace/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use tradeflow::{Lifecycle, LifecycleError, Order, OrderItem, OrderStatus};

use super::{expect_completed, run_flow};
use crate::errors::Result as AppResult;
use crate::models::{Actor, Role};
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::{AdvanceStatus, CancelOrder, ConfirmReceipt, DisputeAction, IssueInvoice, OrderCtxData};
use crate::pipelines::order_pipeline::{ensure_order_visible, OrderAction};
use crate::services::payment_gateway;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OrderDetail {
  pub order: Order,
  pub items: Vec<OrderItem>,
}

async fn run_order_action<A: OrderAction>(
  app_state: &AppState,
  actor: Actor,
  order_id: Uuid,
  action: A,
) -> AppResult<HttpResponse> {
  let ctx = OrderCtxData::new(app_state.clone(), actor, order_id, action);
  let (result, ctx_data) = run_flow(app_state, ctx).await?;
  expect_completed(A::FLOW, result)?;

  let detail = ctx_data.with(|d| -> AppResult<OrderDetail> {
    Ok(OrderDetail {
      order: loaded(&d.order, "order")?,
      items: d.items.clone(),
    })
  })?;
  info!(
    "{} on order {}: status '{}', payment '{}'.",
    A::FLOW,
    detail.order.id,
    detail.order.status,
    detail.order.payment_status
  );
  Ok(HttpResponse::Ok().json(detail))
}

#[instrument(name = "handler::get_order", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  let order_id = path.into_inner();
  let order = app_state.store.get_order(order_id).await?;
  let items = app_state.store.list_order_items(order_id).await?;
  ensure_order_visible(&actor, &order, &items)?;
  Ok(HttpResponse::Ok().json(OrderDetail { order, items }))
}

#[instrument(name = "handler::list_orders", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn list_orders_handler(app_state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
  let orders = app_state.store.list_orders_for(actor.user_id).await?;
  Ok(HttpResponse::Ok().json(orders))
}

/// A fresh payment intent for whatever the buyer still owes on the order.
#[instrument(name = "handler::payment_intent", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn payment_intent_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  actor.require(&[Role::Buyer])?;
  let order = app_state.store.get_order(path.into_inner()).await?;
  if order.user_id != actor.user_id {
    return Err(
      LifecycleError::NotParty {
        entity: OrderStatus::ENTITY,
        id: order.id,
        user_id: actor.user_id,
      }
      .into(),
    );
  }
  if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Returned) {
    return Err(
      LifecycleError::Closed {
        entity: OrderStatus::ENTITY,
        id: order.id,
        status: order.status.as_str(),
      }
      .into(),
    );
  }
  let intent = payment_gateway::create_payment_intent(&order).await?;
  info!(
    "Payment intent {} for order {}: {} cents, settles as '{}'.",
    intent.id, order.id, intent.amount_cents, intent.settles_as
  );
  Ok(HttpResponse::Ok().json(intent))
}

#[instrument(name = "handler::advance_order", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn advance_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<AdvanceStatus>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  run_order_action(&app_state, actor, path.into_inner(), req_payload.into_inner()).await
}

#[instrument(name = "handler::cancel_order", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<CancelOrder>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  run_order_action(&app_state, actor, path.into_inner(), req_payload.into_inner()).await
}

#[instrument(name = "handler::confirm_receipt", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn confirm_receipt_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  run_order_action(&app_state, actor, path.into_inner(), ConfirmReceipt).await
}

#[instrument(name = "handler::open_dispute", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn open_dispute_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  run_order_action(&app_state, actor, path.into_inner(), DisputeAction::Open).await
}

#[instrument(name = "handler::resolve_dispute", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn resolve_dispute_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  run_order_action(&app_state, actor, path.into_inner(), DisputeAction::Resolve).await
}

#[instrument(name = "handler::issue_invoice", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn issue_invoice_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  run_order_action(&app_state, actor, path.into_inner(), IssueInvoice).await
}
