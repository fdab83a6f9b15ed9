// apps/marketplace/src/pipelines/checkout_pipeline.rs
use crate::db::{ChangeSet, StoreError};
use crate::errors::{AppError, Result as AppResult};
use crate::models::Role;
use crate::pipelines::common_steps::{loaded, notify_step};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::payment_gateway;
use crate::state::AppState;
use tradeflow::{ContextData, FlowRegistry, Order, OrderDraft, Pipeline, PipelineControl};
use tracing::{info, instrument, warn};

#[instrument(name = "checkout_step::check_idempotency", skip(ctx_data), err)]
async fn check_idempotency(ctx_data: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (store, actor, key) = {
    let guard = ctx_data.read();
    (guard.app_state.store.clone(), guard.actor, guard.idempotency_key.clone())
  };
  actor.require(&[Role::Buyer])?;
  let Some(key) = key else {
    return Ok(PipelineControl::Continue);
  };

  match store.find_order_by_idempotency_key(actor.user_id, &key).await? {
    Some(order) => {
      info!(
        "Checkout Pipeline (Order {}): idempotency key '{}' seen before, replaying.",
        order.id, key
      );
      ctx_data.write().replayed_order = Some(order);
      Ok(PipelineControl::Stop)
    }
    None => Ok(PipelineControl::Continue),
  }
}

#[instrument(name = "checkout_step::build_order_draft", skip(ctx_data), err)]
async fn build_order_draft(ctx_data: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (store, buyer_id, request, key, now) = {
    let guard = ctx_data.read();
    (
      guard.app_state.store.clone(),
      guard.actor.user_id,
      guard.request.clone(),
      guard.idempotency_key.clone(),
      guard.now,
    )
  };

  let mut changes = ChangeSet::new();
  let draft = match request.quote_id {
    Some(_) if !request.lines.is_empty() => {
      return Err(AppError::Validation(
        "Checkout takes either a quote or catalogue lines, not both".to_string(),
      ));
    }
    Some(quote_id) => {
      let quote = store.get_quote(quote_id).await?;
      let mut rfq = store.get_rfq(quote.rfq_id).await?;
      let draft = OrderDraft::from_quote(&mut rfq, &quote, buyer_id, request.payment_plan, now)?
        .with_idempotency_key(key);
      // converting the RFQ guards against a second checkout of the same quote
      changes.update_rfq(&mut rfq);
      draft
    }
    None => {
      let mut lines = Vec::with_capacity(request.lines.len());
      for line in &request.lines {
        let product = store.get_product(line.product_id).await?;
        lines.push(product.line(line.quantity));
      }
      let draft = OrderDraft::direct(buyer_id, &lines, request.payment_plan, now)?.with_idempotency_key(key);
      for line in &lines {
        changes.reserve_stock(line.product_id, line.quantity);
      }
      draft
    }
  };
  changes.insert_order(&draft.order, &draft.items);

  info!(
    "Checkout Pipeline (Order {}): {} lines, total {} cents, plan '{}'.",
    draft.order.id,
    draft.items.len(),
    draft.order.total_amount_cents,
    draft.order.payment_plan
  );
  ctx_data.update(|data| {
    data.draft = Some(draft);
    data.changes = changes;
  });
  Ok(PipelineControl::Continue)
}

pub fn register_checkout_pipeline(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(
    "checkout",
    &[
      ("check_idempotency", false, None),
      ("build_order_draft", false, None),
      ("persist_order", false, None),
      ("create_payment_intent", false, None),
      ("notify_suppliers", true, None),
    ],
  );

  p.on_root("check_idempotency", check_idempotency);
  p.on_root("build_order_draft", build_order_draft);

  p.on_root("persist_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (store, changes, buyer_id, key) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.changes.clone(),
          guard.actor.user_id,
          guard.idempotency_key.clone(),
        )
      };
      match store.commit(changes).await {
        Ok(()) => Ok::<_, AppError>(PipelineControl::Continue),
        Err(StoreError::Conflict { entity, detail }) => {
          // a concurrent request with the same key may have won the insert
          if let Some(key) = key {
            if let Some(order) = store.find_order_by_idempotency_key(buyer_id, &key).await? {
              warn!(
                "Checkout Pipeline (Order {}): lost the race on key '{}', replaying the winner.",
                order.id, key
              );
              ctx_data.write().replayed_order = Some(order);
              return Ok(PipelineControl::Stop);
            }
          }
          Err(StoreError::Conflict { entity, detail }.into())
        }
        Err(e) => Err(e.into()),
      }
    })
  });

  p.on_root("create_payment_intent", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let order = ctx_data.with(|data| data.draft.as_ref().map(|d| d.order.clone()));
      let order = loaded(&order, "order draft")?;
      // the order is already committed; without an intent the buyer asks
      // for one later instead of checking out again
      match payment_gateway::create_payment_intent(&order).await {
        Ok(intent) => {
          info!(
            "Checkout Pipeline (Order {}): payment intent {} for {} cents, settles as '{}'.",
            order.id, intent.id, intent.amount_cents, intent.settles_as
          );
          ctx_data.write().payment_intent = Some(intent);
        }
        Err(e) => warn!(
          "Checkout Pipeline (Order {}): no payment intent yet, the buyer can request one: {}",
          order.id, e
        ),
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_suppliers", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (app_state, draft, now) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), loaded(&guard.draft, "order draft")?, guard.now)
      };
      for supplier_id in Order::suppliers_of(&draft.items) {
        notify_step(
          &app_state,
          supplier_id,
          &format!("New order {}", draft.order.id),
          &format!(
            "Order {} was placed with payment plan '{}' for {} cents.",
            draft.order.id, draft.order.payment_plan, draft.order.total_amount_cents
          ),
          now,
        )
        .await?;
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}
