// apps/marketplace/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use super::{expect_completed, run_flow};
use crate::errors::Result as AppResult;
use crate::pipelines::contexts::PaymentWebhookCtxData;
use crate::services::payment_gateway::WEBHOOK_SECRET_HEADER;
use crate::state::AppState;

#[instrument(name = "handler::payment_webhook", skip(app_state, req, body), fields(source = %path.as_str()))]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  path: web::Path<String>,
  body: web::Bytes,
) -> AppResult<HttpResponse> {
  let source = path.into_inner();
  let provided_secret = req
    .headers()
    .get(WEBHOOK_SECRET_HEADER)
    .and_then(|h| h.to_str().ok())
    .map(str::to_string);
  info!("Webhook received from '{}' ({} bytes).", source, body.len());

  let state = app_state.get_ref().clone();
  let ctx = PaymentWebhookCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    source: source.clone(),
    body: body.to_vec(),
    provided_secret,
    payload: None,
    order: None,
    applied: false,
  };
  let (result, ctx_data) = run_flow(&state, ctx).await?;
  expect_completed("payment_webhook", result)?;

  let (order, applied) = ctx_data.with(|d| (d.order.clone(), d.applied));
  Ok(HttpResponse::Ok().json(json!({
    "received": true,
    "applied": applied,
    "order_id": order.as_ref().map(|o| o.id),
    "payment_status": order.as_ref().map(|o| o.payment_status),
    "status": order.as_ref().map(|o| o.status),
  })))
}
