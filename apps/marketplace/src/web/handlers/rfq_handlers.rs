// apps/marketplace/src/web/handlers/rfq_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use tradeflow::{Lifecycle, LifecycleError, Quote, QuoteRevision, Rfq, RfqStatus};

use super::{expect_completed, run_flow};
use crate::errors::{AppError, Result as AppResult};
use crate::models::Actor;
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::{RfqRequest, SubmitRfqCtxData};
use crate::state::AppState;

/// An RFQ as readers see it: `status` is the effective status.
#[derive(Debug, Serialize)]
pub struct RfqDetail {
  pub rfq: Rfq,
  pub quotes: Vec<Quote>,
  pub history: Vec<QuoteRevision>,
}

fn with_effective_status(mut rfq: Rfq, state: &AppState) -> Rfq {
  rfq.status = rfq.effective_status(state.clock.now());
  rfq
}

#[instrument(name = "handler::submit_rfq", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn submit_rfq_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<RfqRequest>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  let state = app_state.get_ref().clone();
  let ctx = SubmitRfqCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    actor,
    request: req_payload.into_inner(),
    product: None,
    rfq: None,
  };
  let (result, ctx_data) = run_flow(&state, ctx).await?;
  expect_completed("submit_rfq", result)?;

  let rfq = ctx_data.with(|d| loaded(&d.rfq, "rfq"))?;
  info!("RFQ {} submitted by buyer {}.", rfq.id, actor.user_id);
  Ok(HttpResponse::Created().json(rfq))
}

#[instrument(name = "handler::get_rfq", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn get_rfq_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  let rfq_id = path.into_inner();
  let store = app_state.store.clone();
  let rfq = store.get_rfq(rfq_id).await?;
  if !actor.is_admin() && !rfq.is_participant(actor.user_id) {
    return Err(AppError::Lifecycle(LifecycleError::NotParty {
      entity: RfqStatus::ENTITY,
      id: rfq.id,
      user_id: actor.user_id,
    }));
  }
  let quotes = store.list_quotes(rfq_id).await?;
  let history = store.list_revisions(rfq_id).await?;

  Ok(HttpResponse::Ok().json(RfqDetail {
    rfq: with_effective_status(rfq, &app_state),
    quotes,
    history,
  }))
}

#[instrument(name = "handler::list_rfqs", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn list_rfqs_handler(app_state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
  let rfqs: Vec<Rfq> = app_state
    .store
    .list_rfqs_for(actor.user_id)
    .await?
    .into_iter()
    .map(|rfq| with_effective_status(rfq, &app_state))
    .collect();
  Ok(HttpResponse::Ok().json(rfqs))
}
