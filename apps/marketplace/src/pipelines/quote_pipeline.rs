// apps/marketplace/src/pipelines/quote_pipeline.rs
use crate::errors::{AppError, Result as AppResult};
use crate::models::Role;
use crate::pipelines::common_steps::{loaded, materialize_expiry, notify_step};
use crate::pipelines::contexts::SubmitQuoteCtxData;
use crate::state::AppState;
use tradeflow::{
  ContextData, FlowRegistry, Lifecycle, LifecycleError, NegotiationLog, Pipeline, PipelineControl, Quote, RevisionKind,
  RfqStatus,
};
use tracing::{info, instrument};

#[instrument(name = "quote_step::load_rfq", skip(ctx_data), err)]
async fn load_rfq(ctx_data: ContextData<SubmitQuoteCtxData>) -> AppResult<PipelineControl> {
  let (app_state, rfq_id, actor, now) = {
    let guard = ctx_data.read();
    (guard.app_state.clone(), guard.rfq_id, guard.actor, guard.now)
  };
  actor.require(&[Role::Supplier])?;

  let mut rfq = app_state.store.get_rfq(rfq_id).await?;
  if rfq.supplier_id != actor.user_id {
    return Err(
      LifecycleError::NotParty {
        entity: RfqStatus::ENTITY,
        id: rfq.id,
        user_id: actor.user_id,
      }
      .into(),
    );
  }
  materialize_expiry(&app_state, &mut rfq, now).await?;
  let revisions = app_state.store.list_revisions(rfq.id).await?;
  let log = NegotiationLog::from_revisions(rfq.id, revisions)?;

  ctx_data.update(|data| {
    data.rfq = Some(rfq);
    data.log = Some(log);
  });
  Ok(PipelineControl::Continue)
}

pub fn register_quote_pipelines(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  let mut p = Pipeline::<SubmitQuoteCtxData, AppError>::new(
    "submit_quote",
    &[
      ("load_rfq", false, None),
      ("guard_rfq_open", false, None),
      ("build_quote", false, None),
      ("persist_quote", false, None),
      ("notify_buyer", true, None),
    ],
  );

  p.on_root("load_rfq", load_rfq);

  p.on_root("guard_rfq_open", |ctx_data: ContextData<SubmitQuoteCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      let rfq = loaded(&guard.rfq, "rfq")?;
      rfq.ensure_open_for_quotes(guard.now)?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("build_quote", |ctx_data: ContextData<SubmitQuoteCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let mut rfq = loaded(&data.rfq, "rfq")?;
      let mut log = loaded(&data.log, "negotiation log")?;
      let now = data.now;

      let quote = Quote::new(data.request.clone().into_new_quote(data.actor.user_id), &rfq, now)?;
      let status_before = rfq.status;
      rfq.record_quote(now)?;
      let revision = log.record(&quote, RevisionKind::Offered, data.actor.user_id, None, now);

      if rfq.status != status_before {
        data.changes.update_rfq(&mut rfq);
      }
      data.changes.insert_quote(&quote).append_revision(revision);
      info!(
        "Quote Flow (RFQ {}): quote {} at {} cents x {} (total {}), valid until {}.",
        rfq.id, quote.id, quote.unit_price_cents, quote.agreed_quantity, quote.total_price_cents, quote.valid_until
      );

      data.rfq = Some(rfq);
      data.log = Some(log);
      data.quote = Some(quote);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("persist_quote", |ctx_data: ContextData<SubmitQuoteCtxData>| {
    Box::pin(async move {
      let (store, changes, quote_id) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.changes.clone(),
          guard.quote.as_ref().map(|q| q.id),
        )
      };
      store.commit(changes).await?;
      info!("Quote Flow (Quote {:?}): persisted.", quote_id);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_buyer", |ctx_data: ContextData<SubmitQuoteCtxData>| {
    Box::pin(async move {
      let (app_state, rfq, quote, now) = {
        let guard = ctx_data.read();
        (
          guard.app_state.clone(),
          loaded(&guard.rfq, "rfq")?,
          loaded(&guard.quote, "quote")?,
          guard.now,
        )
      };
      notify_step(
        &app_state,
        rfq.buyer_id,
        &format!("New quote on RFQ {}", rfq.id),
        &format!(
          "Quote {} offers {} units at {} cents each, valid until {}.",
          quote.id, quote.agreed_quantity, quote.unit_price_cents, quote.valid_until
        ),
        now,
      )
      .await
    })
  });

  flows.register(p);
}
