// apps/marketplace/src/pipelines/address_pipeline.rs
use crate::db::ChangeSet;
use crate::errors::AppError;
use crate::models::Address;
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::UpsertAddressCtxData;
use crate::state::AppState;
use tradeflow::{ContextData, FlowRegistry, Pipeline, PipelineControl};
use tracing::info;

pub fn register_address_pipeline(flows: &FlowRegistry<AppError>, _app_state: &AppState) {
  let mut p = Pipeline::<UpsertAddressCtxData, AppError>::new(
    "upsert_address",
    &[("validate_address", false, None), ("persist_address", false, None)],
  );

  p.on_root("validate_address", |ctx_data: ContextData<UpsertAddressCtxData>| {
    Box::pin(async move {
      let (store, user_id, input, now) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.actor.user_id,
          guard.input.clone(),
          guard.now,
        )
      };
      let book = store.list_addresses(user_id).await?;
      let address = Address::from_input(user_id, input, &book, now)?;
      let replaces_default = book.iter().find(|a| a.is_default && a.id != address.id).map(|a| a.id);
      info!(
        "Address Pipeline (User {}): address {} '{}' validated, default: {}.",
        user_id, address.id, address.label, address.is_default
      );
      ctx_data.update(|data| {
        data.address = Some(address);
        data.replaces_default = replaces_default;
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("persist_address", |ctx_data: ContextData<UpsertAddressCtxData>| {
    Box::pin(async move {
      let (store, address, replaces_default) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          loaded(&guard.address, "address")?,
          guard.replaces_default,
        )
      };
      let mut changes = ChangeSet::new();
      changes.upsert_address(&address, replaces_default);
      store.commit(changes).await?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}
