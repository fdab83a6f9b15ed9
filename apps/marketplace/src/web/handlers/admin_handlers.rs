// apps/marketplace/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use super::{expect_completed, run_flow};
use crate::errors::Result as AppResult;
use crate::models::{Actor, Role};
use crate::pipelines::contexts::{ExpireRfqsCtxData, ReleaseEscrowCtxData};
use crate::state::AppState;

#[instrument(name = "handler::expire_rfqs", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn expire_rfqs_handler(app_state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
  actor.require(&[Role::Admin])?;
  let state = app_state.get_ref().clone();
  let ctx = ExpireRfqsCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    due: Vec::new(),
    expired: Vec::new(),
    skipped: Vec::new(),
  };
  let (result, ctx_data) = run_flow(&state, ctx).await?;
  expect_completed("expire_rfqs", result)?;

  let (expired, skipped) = ctx_data.with(|d| (d.expired.clone(), d.skipped.clone()));
  info!("Admin {} expired {} RFQs.", actor.user_id, expired.len());
  Ok(HttpResponse::Ok().json(json!({ "expired": expired, "skipped": skipped })))
}

#[instrument(name = "handler::release_due_escrow", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn release_due_escrow_handler(app_state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
  actor.require(&[Role::Admin])?;
  let state = app_state.get_ref().clone();
  let ctx = ReleaseEscrowCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    due: Vec::new(),
    released: Vec::new(),
    skipped: Vec::new(),
  };
  let (result, ctx_data) = run_flow(&state, ctx).await?;
  expect_completed("release_due_escrow", result)?;

  let (released, skipped) = ctx_data.with(|d| (d.released.clone(), d.skipped.clone()));
  info!("Admin {} released escrow on {} orders.", actor.user_id, released.len());
  Ok(HttpResponse::Ok().json(json!({ "released": released, "skipped": skipped })))
}
