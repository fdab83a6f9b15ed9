// apps/marketplace/tests/common/mod.rs
#![allow(dead_code)] // not every test binary uses every helper

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

use marketplace_app::clock::FixedClock;
use marketplace_app::config::AppConfig;
use marketplace_app::db::{ChangeSet, MarketplaceStore, MemoryStore};
use marketplace_app::errors::{AppError, Result as AppResult};
use marketplace_app::models::{Actor, Address, AddressInput, Product, Role};
use marketplace_app::pipelines::contexts::{
  AcceptQuote, CheckoutCtxData, CheckoutLine, CheckoutRequest, NegotiationCtxData, OrderCtxData,
  PaymentWebhookCtxData, QuoteRequest, RfqRequest, SubmitQuoteCtxData, SubmitRfqCtxData, UpsertAddressCtxData,
};
use marketplace_app::pipelines::negotiation_pipeline::QuoteAction;
use marketplace_app::pipelines::order_pipeline::OrderAction;
use marketplace_app::pipelines::register_all_pipelines;
use marketplace_app::state::AppState;
use tradeflow::{ContextData, Order, PaymentPlan, PipelineResult, Quote, Rfq};

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

pub fn t0() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
}

pub struct TestApp {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub clock: Arc<FixedClock>,
  pub buyer: Actor,
  pub supplier: Actor,
  pub admin: Actor,
  /// Sold by `supplier`: 25.00 per unit, minimum 10, 1000 in stock.
  pub product: Product,
}

pub async fn spawn_app() -> TestApp {
  spawn_app_with(AppConfig::default()).await
}

pub async fn spawn_app_with(config: AppConfig) -> TestApp {
  setup_tracing();
  let store = Arc::new(MemoryStore::new());
  let clock = Arc::new(FixedClock::new(t0()));
  let state = AppState::new(store.clone() as Arc<dyn MarketplaceStore>, Arc::new(config)).with_clock(clock.clone());
  register_all_pipelines(&state.flows, &state);

  let supplier = Actor::new(Uuid::new_v4(), Role::Supplier);
  let product = Product {
    id: Uuid::new_v4(),
    supplier_id: supplier.user_id,
    name: "Galvanised steel bolts M8".to_string(),
    description: Some("Boxes of 100".to_string()),
    price_cents: 2500,
    min_order_quantity: 10,
    stock_quantity: 1000,
    created_at: t0(),
    updated_at: t0(),
  };
  let mut changes = ChangeSet::new();
  changes.upsert_product(&product, None);
  store.commit(changes).await.unwrap();

  TestApp {
    state,
    store,
    clock,
    buyer: Actor::new(Uuid::new_v4(), Role::Buyer),
    supplier,
    admin: Actor::new(Uuid::new_v4(), Role::Admin),
    product,
  }
}

pub fn rfq_request(product_id: Uuid, quantity: i32) -> RfqRequest {
  RfqRequest {
    product_id,
    supplier_id: None,
    quantity,
    target_price_cents: Some(90),
    delivery_location: "Rotterdam, Maasvlakte DC 3".to_string(),
    notes: Some("Palletised, shrink wrapped".to_string()),
    attachments: vec!["drawing-rev-b.pdf".to_string()],
    expires_at: None,
  }
}

pub fn quote_request(unit_price_cents: i64, deposit_percentage: i32) -> QuoteRequest {
  QuoteRequest {
    unit_price_cents,
    agreed_quantity: None,
    valid_until: t0() + Duration::days(7),
    terms: Some("FCA Rotterdam".to_string()),
    deposit_percentage,
    delivery_time: Some("3 weeks".to_string()),
  }
}

pub fn address_input(label: &str, is_default: bool) -> AddressInput {
  AddressInput {
    id: None,
    label: label.to_string(),
    line1: "Industrieweg 4".to_string(),
    line2: None,
    city: "Utrecht".to_string(),
    region: None,
    postal_code: "3542 AD".to_string(),
    country: "NL".to_string(),
    phone: None,
    is_default,
  }
}

pub fn payment_body(order_id: Uuid, kind: &str, transaction_id: &str, amount_cents: i64) -> Vec<u8> {
  serde_json::json!({
    "order_id": order_id,
    "type": kind,
    "transaction_id": transaction_id,
    "amount_cents": amount_cents,
    "method": "bank_transfer",
  })
  .to_string()
  .into_bytes()
}

impl TestApp {
  pub fn now(&self) -> DateTime<Utc> {
    self.state.clock.now()
  }

  pub async fn submit_rfq(&self, quantity: i32) -> AppResult<Rfq> {
    let ctx_data = ContextData::new(SubmitRfqCtxData {
      app_state: self.state.clone(),
      actor: self.buyer,
      now: self.now(),
      request: rfq_request(self.product.id, quantity),
      product: None,
      rfq: None,
    });
    self.state.flows.run(ctx_data.clone()).await?;
    let rfq = ctx_data.read().rfq.clone();
    rfq.ok_or_else(|| AppError::Internal("no rfq".to_string()))
  }

  pub async fn submit_quote_as(&self, actor: Actor, rfq_id: Uuid, request: QuoteRequest) -> AppResult<Quote> {
    let ctx_data = ContextData::new(SubmitQuoteCtxData {
      app_state: self.state.clone(),
      actor,
      now: self.now(),
      rfq_id,
      request,
      rfq: None,
      log: None,
      quote: None,
      changes: ChangeSet::new(),
    });
    self.state.flows.run(ctx_data.clone()).await?;
    let quote = ctx_data.read().quote.clone();
    quote.ok_or_else(|| AppError::Internal("no quote".to_string()))
  }

  pub async fn submit_quote(&self, rfq_id: Uuid, unit_price_cents: i64, deposit_percentage: i32) -> AppResult<Quote> {
    self
      .submit_quote_as(self.supplier, rfq_id, quote_request(unit_price_cents, deposit_percentage))
      .await
  }

  pub async fn negotiate<A: QuoteAction>(&self, actor: Actor, quote_id: Uuid, action: A) -> AppResult<Quote> {
    let ctx_data = ContextData::new(NegotiationCtxData::new(self.state.clone(), actor, quote_id, action));
    self.state.flows.run(ctx_data.clone()).await?;
    let quote = ctx_data.read().quote.clone();
    quote.ok_or_else(|| AppError::Internal("no quote".to_string()))
  }

  pub async fn checkout(
    &self,
    request: CheckoutRequest,
    idempotency_key: Option<&str>,
  ) -> AppResult<(PipelineResult, ContextData<CheckoutCtxData>)> {
    let ctx_data = ContextData::new(CheckoutCtxData {
      app_state: self.state.clone(),
      actor: self.buyer,
      now: self.now(),
      request,
      idempotency_key: idempotency_key.map(str::to_string),
      draft: None,
      changes: ChangeSet::new(),
      replayed_order: None,
      payment_intent: None,
    });
    let result = self.state.flows.run(ctx_data.clone()).await?;
    Ok((result, ctx_data))
  }

  /// Checkout of an accepted quote; returns the new order.
  pub async fn checkout_quote(&self, quote_id: Uuid, plan: PaymentPlan) -> AppResult<Order> {
    let request = CheckoutRequest {
      quote_id: Some(quote_id),
      lines: Vec::new(),
      payment_plan: plan,
    };
    let (_, ctx_data) = self.checkout(request, None).await?;
    let order = ctx_data.read().draft.as_ref().map(|d| d.order.clone());
    order.ok_or_else(|| AppError::Internal("no order".to_string()))
  }

  pub async fn checkout_direct(&self, quantity: i32, plan: PaymentPlan) -> AppResult<Order> {
    let request = CheckoutRequest {
      quote_id: None,
      lines: vec![CheckoutLine {
        product_id: self.product.id,
        quantity,
      }],
      payment_plan: plan,
    };
    let (_, ctx_data) = self.checkout(request, None).await?;
    let order = ctx_data.read().draft.as_ref().map(|d| d.order.clone());
    order.ok_or_else(|| AppError::Internal("no order".to_string()))
  }

  /// RFQ with one accepted quote of 100 units at 1.00 and a 30% deposit.
  pub async fn accepted_quote(&self) -> Quote {
    let rfq = self.submit_rfq(100).await.unwrap();
    let quote = self.submit_quote(rfq.id, 100, 30).await.unwrap();
    self
      .negotiate(self.buyer, quote.id, AcceptQuote)
      .await
      .unwrap()
  }

  pub async fn order_action<A: OrderAction>(&self, actor: Actor, order_id: Uuid, action: A) -> AppResult<Order> {
    let ctx_data = ContextData::new(OrderCtxData::new(self.state.clone(), actor, order_id, action));
    self.state.flows.run(ctx_data.clone()).await?;
    let order = ctx_data.read().order.clone();
    order.ok_or_else(|| AppError::Internal("no order".to_string()))
  }

  pub async fn upsert_address(&self, actor: Actor, input: AddressInput) -> AppResult<Address> {
    let ctx_data = ContextData::new(UpsertAddressCtxData {
      app_state: self.state.clone(),
      actor,
      now: self.now(),
      input,
      address: None,
      replaces_default: None,
    });
    self.state.flows.run(ctx_data.clone()).await?;
    let address = ctx_data.read().address.clone();
    address.ok_or_else(|| AppError::Internal("no address".to_string()))
  }

  /// Delivers a payment event; returns whether it changed the order.
  pub async fn pay(&self, order_id: Uuid, kind: &str, transaction_id: &str, amount_cents: i64) -> AppResult<bool> {
    self
      .webhook(payment_body(order_id, kind, transaction_id, amount_cents), None)
      .await
  }

  pub async fn webhook(&self, body: Vec<u8>, secret: Option<&str>) -> AppResult<bool> {
    let ctx_data = ContextData::new(PaymentWebhookCtxData {
      app_state: self.state.clone(),
      now: self.now(),
      source: "mockpay".to_string(),
      body,
      provided_secret: secret.map(str::to_string),
      payload: None,
      order: None,
      applied: false,
    });
    self.state.flows.run(ctx_data.clone()).await?;
    let applied = ctx_data.read().applied;
    Ok(applied)
  }
}
