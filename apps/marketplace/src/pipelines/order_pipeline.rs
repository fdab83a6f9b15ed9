// apps/marketplace/src/pipelines/order_pipeline.rs

//! Operations on an existing order. Every flow loads the order with its items,
//! checks the caller, applies one lifecycle action and writes the order back
//! under its version.

use crate::db::ChangeSet;
use crate::errors::{AppError, Result as AppResult};
use crate::models::{Actor, Role};
use crate::pipelines::common_steps::{loaded, notify_step};
use crate::pipelines::contexts::{AdvanceStatus, CancelOrder, ConfirmReceipt, DisputeAction, IssueInvoice, OrderCtxData};
use crate::state::AppState;
use std::sync::Arc;
use tradeflow::{
  ContextData, FlowRegistry, Lifecycle, LifecycleError, Order, OrderItem, OrderStatus, Pipeline, PipelineControl,
  ReleaseTrigger, SkipCondition,
};
use tracing::{info, instrument};

fn is_buyer(actor: &Actor, order: &Order) -> bool {
  order.user_id == actor.user_id
}

fn is_supplier(actor: &Actor, items: &[OrderItem]) -> bool {
  items.iter().any(|item| item.supplier_id == Some(actor.user_id))
}

fn not_party(actor: &Actor, order: &Order) -> AppError {
  LifecycleError::NotParty {
    entity: OrderStatus::ENTITY,
    id: order.id,
    user_id: actor.user_id,
  }
  .into()
}

/// Buyer, any supplier of an item, or an admin may see an order.
pub fn ensure_order_visible(actor: &Actor, order: &Order, items: &[OrderItem]) -> AppResult<()> {
  if actor.is_admin() || is_buyer(actor, order) || is_supplier(actor, items) {
    Ok(())
  } else {
    Err(not_party(actor, order))
  }
}

/// An operation on one order.
pub trait OrderAction: Clone + Send + Sync + 'static {
  const FLOW: &'static str;

  fn authorize(&self, actor: &Actor, order: &Order, items: &[OrderItem]) -> AppResult<()>;
}

impl OrderAction for AdvanceStatus {
  const FLOW: &'static str = "advance_order_status";

  fn authorize(&self, actor: &Actor, order: &Order, items: &[OrderItem]) -> AppResult<()> {
    actor.require(&[Role::Supplier, Role::Admin])?;
    if actor.is_admin() || is_supplier(actor, items) {
      Ok(())
    } else {
      Err(not_party(actor, order))
    }
  }
}

impl OrderAction for CancelOrder {
  const FLOW: &'static str = "cancel_order";

  fn authorize(&self, actor: &Actor, order: &Order, _items: &[OrderItem]) -> AppResult<()> {
    actor.require(&[Role::Buyer, Role::Admin])?;
    if actor.is_admin() || is_buyer(actor, order) {
      Ok(())
    } else {
      Err(not_party(actor, order))
    }
  }
}

impl OrderAction for ConfirmReceipt {
  const FLOW: &'static str = "confirm_receipt";

  fn authorize(&self, actor: &Actor, order: &Order, _items: &[OrderItem]) -> AppResult<()> {
    actor.require(&[Role::Buyer])?;
    if is_buyer(actor, order) {
      Ok(())
    } else {
      Err(not_party(actor, order))
    }
  }
}

impl OrderAction for DisputeAction {
  const FLOW: &'static str = "order_dispute";

  fn authorize(&self, actor: &Actor, order: &Order, _items: &[OrderItem]) -> AppResult<()> {
    match self {
      DisputeAction::Open => {
        actor.require(&[Role::Buyer])?;
        if is_buyer(actor, order) {
          Ok(())
        } else {
          Err(not_party(actor, order))
        }
      }
      DisputeAction::Resolve => actor.require(&[Role::Admin]),
    }
  }
}

impl OrderAction for IssueInvoice {
  const FLOW: &'static str = "issue_invoice";

  fn authorize(&self, actor: &Actor, order: &Order, items: &[OrderItem]) -> AppResult<()> {
    ensure_order_visible(actor, order, items)
  }
}

#[instrument(name = "order_step::load_order", skip(ctx_data), fields(flow = A::FLOW), err)]
async fn load_order<A: OrderAction>(ctx_data: ContextData<OrderCtxData<A>>) -> AppResult<PipelineControl> {
  let (store, order_id, actor, action) = {
    let guard = ctx_data.read();
    (guard.app_state.store.clone(), guard.order_id, guard.actor, guard.action.clone())
  };
  let order = store.get_order(order_id).await?;
  let items = store.list_order_items(order_id).await?;
  action.authorize(&actor, &order, &items)?;

  ctx_data.update(|data| {
    data.order = Some(order);
    data.items = items;
  });
  Ok(PipelineControl::Continue)
}

/// Runs `f` against the loaded order and stores the result back. `f` returns
/// whether the order changed.
fn apply_to_order<A: OrderAction>(
  ctx_data: &ContextData<OrderCtxData<A>>,
  f: impl FnOnce(&mut Order, &A, &AppState, chrono::DateTime<chrono::Utc>) -> AppResult<bool>,
) -> AppResult<Order> {
  let mut guard = ctx_data.write();
  let data = &mut *guard;
  let mut order = loaded(&data.order, "order")?;
  let changed = f(&mut order, &data.action, &data.app_state, data.now)?;
  data.changed |= changed;
  data.order = Some(order.clone());
  Ok(order)
}

/// load_order, `apply_step`, `extra_steps`, persist_order. Persistence is
/// skipped when nothing changed.
fn order_pipeline<A: OrderAction>(apply_step: &str, extra_steps: &[(&str, bool)]) -> Pipeline<OrderCtxData<A>, AppError> {
  let skip_unchanged: SkipCondition<OrderCtxData<A>> =
    Arc::new(|ctx_data: ContextData<OrderCtxData<A>>| ctx_data.with(|d| !d.changed));

  let mut steps = vec![("load_order", false, None), (apply_step, false, None)];
  steps.extend(extra_steps.iter().map(|(name, optional)| (*name, *optional, None)));
  // persist before notifications
  let notify_at = steps
    .iter()
    .position(|(name, _, _)| name.starts_with("notify_"))
    .unwrap_or(steps.len());
  steps.insert(notify_at, ("persist_order", false, Some(skip_unchanged)));

  let mut p = Pipeline::<OrderCtxData<A>, AppError>::new(A::FLOW, &steps);
  p.on_root("load_order", load_order::<A>);
  p.on_root("persist_order", |ctx_data: ContextData<OrderCtxData<A>>| {
    Box::pin(async move {
      let (store, mut order) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), loaded(&guard.order, "order")?)
      };
      let mut changes = ChangeSet::new();
      changes.update_order(&mut order);
      store.commit(changes).await?;
      info!(
        "Order Flow (Order {}): {} persisted at version {} (status '{}', payment '{}').",
        order.id,
        A::FLOW,
        order.version,
        order.status,
        order.payment_status
      );
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });
  p
}

fn register_advance(flows: &FlowRegistry<AppError>) {
  let mut p = order_pipeline::<AdvanceStatus>("apply_status", &[("arm_escrow_deadline", false), ("notify_buyer", true)]);

  p.on_root("apply_status", |ctx_data: ContextData<OrderCtxData<AdvanceStatus>>| {
    Box::pin(async move {
      let order = apply_to_order(&ctx_data, |order, action, _, now| {
        order.transition(action.status, now)?;
        Ok(true)
      })?;
      info!("Order Flow (Order {}): moved to '{}'.", order.id, order.status);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("arm_escrow_deadline", |ctx_data: ContextData<OrderCtxData<AdvanceStatus>>| {
    Box::pin(async move {
      let order = apply_to_order(&ctx_data, |order, _, app_state, _| {
        Ok(order.arm_escrow_deadline(&app_state.config.escrow_policy()))
      })?;
      if let Some(deadline) = order.escrow_release_deadline {
        info!("Order Flow (Order {}): escrow release due at {}.", order.id, deadline);
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_buyer", |ctx_data: ContextData<OrderCtxData<AdvanceStatus>>| {
    Box::pin(async move {
      let (app_state, order, now) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), loaded(&guard.order, "order")?, guard.now)
      };
      notify_step(
        &app_state,
        order.user_id,
        &format!("Order {} is {}", order.id, order.status),
        &format!("Your order {} moved to '{}'.", order.id, order.status),
        now,
      )
      .await
    })
  });

  flows.register(p);
}

fn register_cancel(flows: &FlowRegistry<AppError>) {
  let mut p = order_pipeline::<CancelOrder>("apply_cancellation", &[]);

  p.on_root("apply_cancellation", |ctx_data: ContextData<OrderCtxData<CancelOrder>>| {
    Box::pin(async move {
      let order = apply_to_order(&ctx_data, |order, action, _, now| {
        order.cancel(&action.reason, now)?;
        Ok(true)
      })?;
      info!(
        "Order Flow (Order {}): cancelled ({}).",
        order.id,
        order.cancellation_reason.as_deref().unwrap_or_default()
      );
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_confirm_receipt(flows: &FlowRegistry<AppError>) {
  let mut p = order_pipeline::<ConfirmReceipt>("apply_release", &[]);

  p.on_root("apply_release", |ctx_data: ContextData<OrderCtxData<ConfirmReceipt>>| {
    Box::pin(async move {
      let order = apply_to_order(&ctx_data, |order, _, _, now| {
        order.release_escrow(ReleaseTrigger::BuyerConfirmed, now)?;
        Ok(true)
      })?;
      info!("Order Flow (Order {}): buyer confirmed receipt, escrow released.", order.id);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_dispute(flows: &FlowRegistry<AppError>) {
  let mut p = order_pipeline::<DisputeAction>("apply_dispute", &[]);

  p.on_root("apply_dispute", |ctx_data: ContextData<OrderCtxData<DisputeAction>>| {
    Box::pin(async move {
      let order = apply_to_order(&ctx_data, |order, action, _, now| {
        match action {
          DisputeAction::Open => order.open_dispute(now)?,
          DisputeAction::Resolve => order.resolve_dispute(now)?,
        }
        Ok(true)
      })?;
      info!("Order Flow (Order {}): dispute is now '{}'.", order.id, order.dispute_status);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_invoice(flows: &FlowRegistry<AppError>) {
  let mut p = order_pipeline::<IssueInvoice>("issue_invoice", &[]);

  p.on_root("issue_invoice", |ctx_data: ContextData<OrderCtxData<IssueInvoice>>| {
    Box::pin(async move {
      let order = apply_to_order(&ctx_data, |order, _, app_state, now| {
        Ok(order.issue_invoice(&app_state.config.app_base_url, now)?)
      })?;
      info!("Order Flow (Order {}): invoice at {:?}.", order.id, order.invoice_url);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

pub fn register_order_pipelines(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  register_advance(flows);
  register_cancel(flows);
  register_confirm_receipt(flows);
  register_dispute(flows);
  register_invoice(flows);
}
