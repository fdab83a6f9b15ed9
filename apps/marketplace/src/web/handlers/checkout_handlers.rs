// apps/marketplace/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::{info, instrument, warn};

use tradeflow::{Order, OrderItem, PipelineResult};

use super::run_flow;
use crate::errors::{AppError, Result as AppResult};
use crate::models::Actor;
use crate::pipelines::common_steps::loaded;
use crate::pipelines::contexts::{CheckoutCtxData, CheckoutRequest};
use crate::services::PaymentIntent;
use crate::state::AppState;
use crate::web::extractors::idempotency_key;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
  pub order: Order,
  pub items: Vec<OrderItem>,
  /// Absent on a replay; the original intent was handed out with the first response.
  pub payment_intent: Option<PaymentIntent>,
  pub replayed: bool,
}

#[instrument(name = "handler::checkout", skip(app_state, req, req_payload), fields(user_id = %actor.user_id))]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  req_payload: web::Json<CheckoutRequest>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  let state = app_state.get_ref().clone();
  let ctx = CheckoutCtxData {
    now: state.clock.now(),
    app_state: state.clone(),
    actor,
    request: req_payload.into_inner(),
    idempotency_key: idempotency_key(&req),
    draft: None,
    changes: Default::default(),
    replayed_order: None,
    payment_intent: None,
  };

  match run_flow(&state, ctx).await? {
    (PipelineResult::Completed, ctx_data) => {
      let (draft, payment_intent) = ctx_data.with(|d| (loaded(&d.draft, "order draft"), d.payment_intent.clone()));
      let draft = draft?;
      info!(
        "Checkout completed for buyer {}: order {} ({} cents).",
        actor.user_id, draft.order.id, draft.order.total_amount_cents
      );
      Ok(HttpResponse::Created().json(CheckoutResponse {
        order: draft.order,
        items: draft.items,
        payment_intent,
        replayed: false,
      }))
    }
    (PipelineResult::Stopped, ctx_data) => {
      let Some(order) = ctx_data.with(|d| d.replayed_order.clone()) else {
        warn!("Checkout for buyer {} stopped without a replayed order.", actor.user_id);
        return Err(AppError::PipelineHaltedByHandler);
      };
      let items = state.store.list_order_items(order.id).await?;
      Ok(HttpResponse::Ok().json(CheckoutResponse {
        order,
        items,
        payment_intent: None,
        replayed: true,
      }))
    }
  }
}
