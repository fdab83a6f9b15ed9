// apps/marketplace/src/web/handlers/quote_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use tradeflow::{Quote, Rfq};

use super::{expect_completed, run_flow};
use crate::errors::Result as AppResult;
use crate::models::Actor;
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::{
  AcceptQuote, CounterQuote, NegotiationCtxData, QuoteRequest, RejectQuote, ReviseQuote, SubmitQuoteCtxData,
};
use crate::pipelines::negotiation_pipeline::QuoteAction;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NegotiationOutcome {
  pub quote: Quote,
  pub rfq: Rfq,
}

#[instrument(name = "handler::submit_quote", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn submit_quote_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<QuoteRequest>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  let state = app_state.get_ref().clone();
  let ctx = SubmitQuoteCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    actor,
    rfq_id: path.into_inner(),
    request: req_payload.into_inner(),
    rfq: None,
    log: None,
    quote: None,
    changes: Default::default(),
  };
  let (result, ctx_data) = run_flow(&state, ctx).await?;
  expect_completed("submit_quote", result)?;

  let quote = ctx_data.with(|d| loaded(&d.quote, "quote"))?;
  info!("Quote {} submitted on RFQ {}.", quote.id, quote.rfq_id);
  Ok(HttpResponse::Created().json(quote))
}

async fn negotiate<A: QuoteAction>(
  app_state: &AppState,
  actor: Actor,
  quote_id: Uuid,
  action: A,
) -> AppResult<HttpResponse> {
  let ctx = NegotiationCtxData::new(app_state.clone(), actor, quote_id, action);
  let (result, ctx_data) = run_flow(app_state, ctx).await?;
  expect_completed(A::FLOW, result)?;

  let outcome = ctx_data.with(|d| -> AppResult<NegotiationOutcome> {
    Ok(NegotiationOutcome {
      quote: loaded(&d.quote, "quote")?,
      rfq: loaded(&d.rfq, "rfq")?,
    })
  })?;
  info!(
    "Quote {} is now '{}', RFQ {} is '{}'.",
    outcome.quote.id, outcome.quote.status, outcome.rfq.id, outcome.rfq.status
  );
  Ok(HttpResponse::Ok().json(outcome))
}

#[instrument(name = "handler::accept_quote", skip(app_state), fields(user_id = %actor.user_id))]
pub async fn accept_quote_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  negotiate(&app_state, actor, path.into_inner(), AcceptQuote).await
}

#[instrument(name = "handler::reject_quote", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn reject_quote_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<RejectQuote>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  negotiate(&app_state, actor, path.into_inner(), req_payload.into_inner()).await
}

#[instrument(name = "handler::counter_quote", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn counter_quote_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<CounterQuote>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  negotiate(&app_state, actor, path.into_inner(), req_payload.into_inner()).await
}

#[instrument(name = "handler::revise_quote", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn revise_quote_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  req_payload: web::Json<ReviseQuote>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  negotiate(&app_state, actor, path.into_inner(), req_payload.into_inner()).await
}
