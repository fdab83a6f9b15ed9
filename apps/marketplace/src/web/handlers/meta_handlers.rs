// apps/marketplace/src/web/handlers/meta_handlers.rs

use actix_web::HttpResponse;
use serde_json::json;

use tradeflow::{OrderStatus, PaymentPlan, PaymentStatus, QuoteStatus, RfqStatus, TransitionTable};

pub async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Published transition tables, so clients can render the allowed actions.
pub async fn lifecycle_tables_handler() -> HttpResponse {
  let payment_paths: serde_json::Map<String, serde_json::Value> = PaymentPlan::VARIANTS
    .iter()
    .map(|plan| (plan.as_str().to_string(), json!(plan.path())))
    .collect();

  HttpResponse::Ok().json(json!({
    "rfq": TransitionTable::of::<RfqStatus>(),
    "quote": TransitionTable::of::<QuoteStatus>(),
    "order": TransitionTable::of::<OrderStatus>(),
    "payment": TransitionTable::of::<PaymentStatus>(),
    "payment_plans": payment_paths,
    "cancellable": OrderStatus::CANCELLABLE,
  }))
}
