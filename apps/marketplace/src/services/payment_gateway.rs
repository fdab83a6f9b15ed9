// apps/marketplace/src/services/payment_gateway.rs

//! Mock payment provider: hands out payment intents at checkout and decodes
//! the webhook callbacks that confirm them.

use crate::errors::{AppError, Result as AppResult};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use tradeflow::{Order, PaymentEvent, PaymentPlan, PaymentStatus};
use uuid::Uuid;

pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
  pub id: String,
  pub order_id: Uuid,
  pub amount_cents: i64,
  /// Event type the provider will report once this intent is paid.
  pub settles_as: &'static str,
  pub status: String, // "requires_action", "succeeded", "failed"
  pub client_secret: Option<String>,
}

/// Body of `POST /webhooks/{source}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookPayload {
  pub order_id: Uuid,
  #[serde(flatten)]
  pub event: PaymentEvent,
}

fn settles_as(order: &Order) -> &'static str {
  match (order.payment_plan, order.payment_status) {
    (PaymentPlan::Escrow, _) => "escrow_funded",
    (PaymentPlan::Deposit, PaymentStatus::Pending) => "deposit_paid",
    _ => "full_paid",
  }
}

/// Creates a payment intent for whatever `order` currently has outstanding.
#[instrument(skip(order), fields(order_id = %order.id, amount = order.amount_outstanding()))]
pub async fn create_payment_intent(order: &Order) -> AppResult<PaymentIntent> {
  let amount_cents = order.amount_outstanding();
  if amount_cents <= 0 {
    return Err(AppError::Payment(format!("Order {} has nothing outstanding", order.id)));
  }
  tokio::time::sleep(std::time::Duration::from_millis(5)).await; // Simulate network latency

  if order.idempotency_key.as_deref().is_some_and(|key| key.contains("fail_test")) {
    warn!("Simulated payment provider outage for order {}", order.id);
    return Err(AppError::Payment("Payment provider unavailable".to_string()));
  }

  let intent_id = format!("mock_pi_{}", Uuid::new_v4());
  info!("Simulated payment intent {} created", intent_id);
  Ok(PaymentIntent {
    id: intent_id.clone(),
    order_id: order.id,
    amount_cents,
    settles_as: settles_as(order),
    status: "requires_action".to_string(),
    client_secret: Some(format!("{}_secret_{}", intent_id, Uuid::new_v4())),
  })
}

/// Checks the shared secret of a webhook call. Without a configured secret
/// every call passes.
pub fn verify_secret(expected: Option<&str>, provided: Option<&str>) -> AppResult<()> {
  let Some(expected) = expected else {
    return Ok(());
  };
  let provided = provided.ok_or_else(|| AppError::Auth(format!("Missing {} header", WEBHOOK_SECRET_HEADER)))?;
  // constant time over the common length
  let matches = expected.len() == provided.len()
    && expected
      .bytes()
      .zip(provided.bytes())
      .fold(0u8, |acc, (a, b)| acc | (a ^ b))
      == 0;
  if matches {
    Ok(())
  } else {
    warn!("Webhook secret mismatch");
    Err(AppError::Auth("Invalid webhook secret".to_string()))
  }
}

pub fn parse_webhook(source: &str, body: &[u8]) -> AppResult<WebhookPayload> {
  let payload: WebhookPayload = serde_json::from_slice(body)
    .map_err(|e| AppError::Validation(format!("Invalid {} webhook payload: {}", source, e)))?;
  if payload.event.transaction_id().trim().is_empty() {
    return Err(AppError::Validation("transaction_id must not be empty".to_string()));
  }
  if payload.event.amount_cents() <= 0 {
    return Err(AppError::Validation("amount_cents must be positive".to_string()));
  }
  Ok(payload)
}
