// apps/marketplace/src/pipelines/rfq_pipeline.rs
use crate::db::ChangeSet;
use crate::errors::{AppError, Result as AppResult};
use crate::models::Role;
use crate::pipelines::common_steps::{loaded, notify_step};
use crate::pipelines::contexts::SubmitRfqCtxData;
use crate::state::AppState;
use tradeflow::{ContextData, FlowRegistry, NewRfq, Pipeline, PipelineControl, Rfq};
use tracing::{info, instrument};

#[instrument(name = "rfq_step::load_product", skip(ctx_data), err)]
async fn load_product(ctx_data: ContextData<SubmitRfqCtxData>) -> AppResult<PipelineControl> {
  let (store, actor, product_id, requested_supplier) = {
    let guard = ctx_data.read();
    (
      guard.app_state.store.clone(),
      guard.actor,
      guard.request.product_id,
      guard.request.supplier_id,
    )
  };
  actor.require(&[Role::Buyer])?;
  let product = store.get_product(product_id).await?;
  if let Some(supplier_id) = requested_supplier {
    if supplier_id != product.supplier_id {
      return Err(AppError::Validation(format!(
        "Product {} is not sold by supplier {}",
        product_id, supplier_id
      )));
    }
  }
  ctx_data.write().product = Some(product);
  Ok(PipelineControl::Continue)
}

fn validate_rfq_input(ctx_data: &ContextData<SubmitRfqCtxData>) -> AppResult<Rfq> {
  let guard = ctx_data.read();
  let product = loaded(&guard.product, "product")?;
  let request = guard.request.clone();
  let input = NewRfq {
    buyer_id: guard.actor.user_id,
    supplier_id: product.supplier_id,
    product_id: product.id,
    quantity: request.quantity,
    target_price_cents: request.target_price_cents,
    delivery_location: request.delivery_location,
    notes: request.notes,
    attachments: request.attachments,
    expires_at: request.expires_at,
  };
  Ok(Rfq::new(input, guard.now, guard.app_state.config.rfq_default_ttl())?)
}

pub fn register_rfq_pipelines(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  let mut p = Pipeline::<SubmitRfqCtxData, AppError>::new(
    "submit_rfq",
    &[
      ("load_product", false, None),
      ("validate_rfq_input", false, None),
      ("persist_rfq", false, None),
      ("notify_supplier", true, None),
    ],
  );

  p.on_root("load_product", load_product);

  p.on_root("validate_rfq_input", |ctx_data: ContextData<SubmitRfqCtxData>| {
    Box::pin(async move {
      let rfq = validate_rfq_input(&ctx_data)?;
      info!(
        "RFQ Flow (RFQ {}): buyer {} asks supplier {} for {} units, expires {}.",
        rfq.id, rfq.buyer_id, rfq.supplier_id, rfq.quantity, rfq.expires_at
      );
      ctx_data.write().rfq = Some(rfq);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("persist_rfq", |ctx_data: ContextData<SubmitRfqCtxData>| {
    Box::pin(async move {
      let (store, rfq) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), loaded(&guard.rfq, "rfq")?)
      };
      let mut changes = ChangeSet::new();
      changes.insert_rfq(&rfq);
      store.commit(changes).await?;
      info!("RFQ Flow (RFQ {}): persisted.", rfq.id);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_supplier", |ctx_data: ContextData<SubmitRfqCtxData>| {
    Box::pin(async move {
      let (app_state, rfq, product_name, now) = {
        let guard = ctx_data.read();
        (
          guard.app_state.clone(),
          loaded(&guard.rfq, "rfq")?,
          guard.product.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
          guard.now,
        )
      };
      notify_step(
        &app_state,
        rfq.supplier_id,
        &format!("New RFQ {} for {}", rfq.id, product_name),
        &format!(
          "A buyer requests {} units delivered to {}. Quote before {}.",
          rfq.quantity, rfq.delivery_location, rfq.expires_at
        ),
        now,
      )
      .await
    })
  });

  flows.register(p);
}
