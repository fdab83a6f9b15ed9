// apps/marketplace/src/pipelines/webhook_pipeline.rs

use crate::db::ChangeSet;
use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::PaymentWebhookCtxData;
use crate::services::payment_gateway;
use crate::state::AppState;
use std::sync::Arc;
use tradeflow::{ContextData, FlowRegistry, Pipeline, PipelineControl, SkipCondition};
use tracing::{info, instrument, warn};

#[instrument(name = "webhook_step::load_order", skip(ctx_data), err)]
async fn load_order(ctx_data: ContextData<PaymentWebhookCtxData>) -> AppResult<PipelineControl> {
  let (store, payload) = {
    let guard = ctx_data.read();
    (guard.app_state.store.clone(), loaded(&guard.payload, "webhook payload")?)
  };
  let order = store.get_order(payload.order_id).await?;
  ctx_data.write().order = Some(order);
  Ok(PipelineControl::Continue)
}

pub fn register_webhook_pipeline(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  let no_secret_configured: SkipCondition<PaymentWebhookCtxData> = Arc::new(|ctx_data: ContextData<PaymentWebhookCtxData>| {
    ctx_data.with(|d| d.app_state.config.webhook_secret.is_none())
  });
  let replayed: SkipCondition<PaymentWebhookCtxData> =
    Arc::new(|ctx_data: ContextData<PaymentWebhookCtxData>| ctx_data.with(|d| !d.applied));

  let mut p = Pipeline::<PaymentWebhookCtxData, AppError>::new(
    "payment_webhook",
    &[
      ("verify_webhook_secret", true, Some(no_secret_configured)),
      ("parse_payment_event", false, None),
      ("load_order", false, None),
      ("apply_payment", false, None),
      ("arm_escrow_deadline", false, Some(replayed.clone())),
      ("persist_order", false, Some(replayed)),
    ],
  );

  p.on_root("verify_webhook_secret", |ctx_data: ContextData<PaymentWebhookCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      payment_gateway::verify_secret(
        guard.app_state.config.webhook_secret.as_deref(),
        guard.provided_secret.as_deref(),
      )
      .inspect_err(|_| warn!("Webhook Pipeline: rejected call from source '{}'.", guard.source))?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("parse_payment_event", |ctx_data: ContextData<PaymentWebhookCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let payload = payment_gateway::parse_webhook(&guard.source, &guard.body)?;
      info!(
        "Webhook Pipeline (Order {}): '{}' event, transaction {} for {} cents.",
        payload.order_id,
        payload.event.target_status(),
        payload.event.transaction_id(),
        payload.event.amount_cents()
      );
      guard.payload = Some(payload);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("load_order", load_order);

  p.on_root("apply_payment", |ctx_data: ContextData<PaymentWebhookCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let payload = loaded(&data.payload, "webhook payload")?;
      let mut order = loaded(&data.order, "order")?;

      data.applied = order.apply_payment(&payload.event, data.now)?;
      if data.applied {
        info!(
          "Webhook Pipeline (Order {}): payment is now '{}', order '{}'.",
          order.id, order.payment_status, order.status
        );
      } else {
        info!(
          "Webhook Pipeline (Order {}): transaction {} already applied, ignoring replay.",
          order.id,
          payload.event.transaction_id()
        );
      }
      data.order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // escrow funded after delivery starts its release clock here
  p.on_root("arm_escrow_deadline", |ctx_data: ContextData<PaymentWebhookCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let policy = data.app_state.config.escrow_policy();
      if let Some(order) = data.order.as_mut() {
        if order.arm_escrow_deadline(&policy) {
          info!(
            "Webhook Pipeline (Order {}): escrow release due at {:?}.",
            order.id, order.escrow_release_deadline
          );
        }
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("persist_order", |ctx_data: ContextData<PaymentWebhookCtxData>| {
    Box::pin(async move {
      let (store, mut order) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), loaded(&guard.order, "order")?)
      };
      let mut changes = ChangeSet::new();
      changes.update_order(&mut order);
      store.commit(changes).await?;
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}
