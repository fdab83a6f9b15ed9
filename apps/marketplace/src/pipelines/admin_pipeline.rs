// apps/marketplace/src/pipelines/admin_pipeline.rs

//! Sweeps an operator (or a cron job calling the admin routes) runs to
//! persist what time alone has decided: overdue RFQs and escrow past its
//! release deadline. Each entity is committed on its own; one that changed
//! underneath the sweep is skipped and picked up by the next run.

use crate::db::{ChangeSet, StoreError};
use crate::errors::AppError;
use crate::pipelines::contexts::{ExpireRfqsCtxData, ReleaseEscrowCtxData};
use crate::state::AppState;
use tradeflow::{ContextData, FlowRegistry, Pipeline, PipelineControl, ReleaseTrigger};
use tracing::{info, warn};

fn register_expire_rfqs(flows: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<ExpireRfqsCtxData, AppError>::new(
    "expire_rfqs",
    &[("collect_due_rfqs", false, None), ("persist_expiry", false, None)],
  );

  p.on_root("collect_due_rfqs", |ctx_data: ContextData<ExpireRfqsCtxData>| {
    Box::pin(async move {
      let (store, now) = ctx_data.with(|d| (d.app_state.store.clone(), d.now));
      let due = store.list_overdue_rfqs(now).await?;
      info!("Expiry Sweep: {} RFQs overdue at {}.", due.len(), now);
      ctx_data.write().due = due;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("persist_expiry", |ctx_data: ContextData<ExpireRfqsCtxData>| {
    Box::pin(async move {
      let (store, due, now) = ctx_data.with(|d| (d.app_state.store.clone(), d.due.clone(), d.now));
      let (mut expired, mut skipped) = (Vec::new(), Vec::new());
      for mut rfq in due {
        if !rfq.expire_if_due(now) {
          continue;
        }
        let mut changes = ChangeSet::new();
        changes.update_rfq(&mut rfq);
        match store.commit(changes).await {
          Ok(()) => expired.push(rfq.id),
          Err(StoreError::Conflict { detail, .. }) => {
            warn!("Expiry Sweep: RFQ {} changed concurrently, skipping ({}).", rfq.id, detail);
            skipped.push(rfq.id);
          }
          Err(e) => return Err(e.into()),
        }
      }
      info!("Expiry Sweep: {} RFQs expired, {} skipped.", expired.len(), skipped.len());
      ctx_data.update(|d| {
        d.expired = expired;
        d.skipped = skipped;
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_release_escrow(flows: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<ReleaseEscrowCtxData, AppError>::new(
    "release_due_escrow",
    &[("collect_due_orders", false, None), ("persist_releases", false, None)],
  );

  p.on_root("collect_due_orders", |ctx_data: ContextData<ReleaseEscrowCtxData>| {
    Box::pin(async move {
      let (store, now) = ctx_data.with(|d| (d.app_state.store.clone(), d.now));
      let due: Vec<_> = store
        .list_escrow_due(now)
        .await?
        .into_iter()
        .filter(|order| order.is_release_due(now))
        .collect();
      info!("Escrow Sweep: {} orders past their release deadline.", due.len());
      ctx_data.write().due = due;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("persist_releases", |ctx_data: ContextData<ReleaseEscrowCtxData>| {
    Box::pin(async move {
      let (store, due, now) = ctx_data.with(|d| (d.app_state.store.clone(), d.due.clone(), d.now));
      let (mut released, mut skipped) = (Vec::new(), Vec::new());
      for mut order in due {
        if let Err(e) = order.release_escrow(ReleaseTrigger::DeadlineElapsed, now) {
          warn!("Escrow Sweep: order {} not released: {}.", order.id, e);
          skipped.push(order.id);
          continue;
        }
        let mut changes = ChangeSet::new();
        changes.update_order(&mut order);
        match store.commit(changes).await {
          Ok(()) => released.push(order.id),
          Err(StoreError::Conflict { detail, .. }) => {
            warn!("Escrow Sweep: order {} changed concurrently, skipping ({}).", order.id, detail);
            skipped.push(order.id);
          }
          Err(e) => return Err(e.into()),
        }
      }
      info!("Escrow Sweep: {} released, {} skipped.", released.len(), skipped.len());
      ctx_data.update(|d| {
        d.released = released;
        d.skipped = skipped;
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

pub fn register_admin_pipelines(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  register_expire_rfqs(flows);
  register_release_escrow(flows);
}
