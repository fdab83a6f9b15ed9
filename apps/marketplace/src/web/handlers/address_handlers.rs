// apps/marketplace/src/web/handlers/address_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;

use super::{expect_completed, run_flow};
use crate::errors::Result as AppResult;
use crate::models::{Actor, AddressInput};
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::UpsertAddressCtxData;
use crate::state::AppState;

#[instrument(name = "handler::upsert_address", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn upsert_address_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<AddressInput>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  let state = app_state.get_ref().clone();
  let ctx = UpsertAddressCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    actor,
    input: req_payload.into_inner(),
    address: None,
    replaces_default: None,
  };
  let (result, ctx_data) = run_flow(&state, ctx).await?;
  expect_completed("upsert_address", result)?;
  let address = ctx_data.with(|d| loaded(&d.address, "address"))?;
  Ok(HttpResponse::Ok().json(address))
}

#[instrument(name = "handler::list_addresses", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn list_addresses_handler(app_state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
  let addresses = app_state.store.list_addresses(actor.user_id).await?;
  Ok(HttpResponse::Ok().json(addresses))
}
