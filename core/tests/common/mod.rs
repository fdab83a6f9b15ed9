// tests/common/mod.rs
#![allow(dead_code)] // not every test binary uses every helper

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use tracing::Level;
use tradeflow::flow::{Handler, HandlerFuture};
use tradeflow::{
  ContextData, FlowError, NewQuote, NewRfq, OrderDraft, PaymentPlan, PipelineControl, Quote, Rfq,
};
use uuid::Uuid;

// --- Flow engine fixtures ---

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Flow engine error: {0}")]
  Flow(String),

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<FlowError> for TestError {
  fn from(err: FlowError) -> Self {
    TestError::Flow(format!("{:?}", err))
  }
}

pub fn create_simple_handler(step_name: &'static str, message_to_append: &'static str) -> Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| -> HandlerFuture<TestError> {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.message.push_str(message_to_append);
      guard.steps_executed.push(step_name.to_string());
      tracing::debug!(target: "test_handlers", step = step_name, counter = guard.counter, "executed");
      if guard.should_stop_at.as_deref() == Some(step_name) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn create_failing_handler(step_name: &'static str, error_message: &'static str) -> Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| -> HandlerFuture<TestError> {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      tracing::warn!(target: "test_handlers", step = step_name, "failing with: '{}'", error_message);
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Lifecycle fixtures ---

pub fn t0() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap()
}

pub struct Parties {
  pub buyer: Uuid,
  pub supplier: Uuid,
  pub product: Uuid,
}

impl Parties {
  pub fn new() -> Self {
    Self {
      buyer: Uuid::new_v4(),
      supplier: Uuid::new_v4(),
      product: Uuid::new_v4(),
    }
  }
}

pub fn new_rfq(parties: &Parties, quantity: i32, ttl_days: i64) -> Rfq {
  Rfq::new(
    NewRfq {
      buyer_id: parties.buyer,
      supplier_id: parties.supplier,
      product_id: parties.product,
      quantity,
      target_price_cents: None,
      delivery_location: "Hamburg Port, Warehouse 7".to_string(),
      notes: Some("palletised please".to_string()),
      attachments: vec!["datasheet.pdf".to_string()],
      expires_at: None,
    },
    t0(),
    Duration::days(ttl_days),
  )
  .unwrap()
}

/// Builds a quote and records it on the RFQ, as the submit-quote flow does.
pub fn quote_on(rfq: &mut Rfq, unit_price_cents: i64, deposit_percentage: i32) -> Quote {
  let quote = Quote::new(
    NewQuote {
      supplier_id: rfq.supplier_id,
      unit_price_cents,
      agreed_quantity: None,
      valid_until: t0() + Duration::days(7),
      terms: Some("FOB".to_string()),
      deposit_percentage,
      delivery_time: Some("2 weeks".to_string()),
    },
    rfq,
    t0(),
  )
  .unwrap();
  rfq.record_quote(t0()).unwrap();
  quote
}

/// RFQ with one accepted quote.
pub fn accepted_pair(parties: &Parties, quantity: i32, unit_price_cents: i64, deposit_percentage: i32) -> (Rfq, Quote) {
  let mut rfq = new_rfq(parties, quantity, 14);
  let mut quote = quote_on(&mut rfq, unit_price_cents, deposit_percentage);
  quote.accept(&rfq, t0()).unwrap();
  rfq.transition(tradeflow::RfqStatus::Accepted, t0()).unwrap();
  (rfq, quote)
}

pub fn quoted_order(parties: &Parties, plan: PaymentPlan) -> OrderDraft {
  let (mut rfq, quote) = accepted_pair(parties, 100, 100, 30);
  OrderDraft::from_quote(&mut rfq, &quote, parties.buyer, plan, t0()).unwrap()
}
