// apps/marketplace/src/pipelines/contexts.rs

//! Context data of every flow. Handlers receive these wrapped in
//! `tradeflow::ContextData`; each flow is registered under its own type.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use tradeflow::{
  NegotiationLog, NewQuote, Order, OrderDraft, OrderItem, OrderStatus, PaymentPlan, Quote, Revision, Rfq,
};

use crate::db::ChangeSet;
use crate::models::{Actor, Address, AddressInput, Product};
use crate::services::{PaymentIntent, WebhookPayload};
use crate::state::AppState;

// --- RFQ ---

/// Body of `POST /rfqs`. Without `supplier_id` the RFQ goes to the product's
/// supplier.
#[derive(Debug, Clone, Deserialize)]
pub struct RfqRequest {
  pub product_id: Uuid,
  pub supplier_id: Option<Uuid>,
  pub quantity: i32,
  pub target_price_cents: Option<i64>,
  pub delivery_location: String,
  pub notes: Option<String>,
  #[serde(default)]
  pub attachments: Vec<String>,
  pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SubmitRfqCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub now: DateTime<Utc>,
  pub request: RfqRequest,
  pub product: Option<Product>,
  pub rfq: Option<Rfq>,
}

// --- Quotes ---

/// Body of `POST /rfqs/{id}/quotes`; the supplier is the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
  pub unit_price_cents: i64,
  pub agreed_quantity: Option<i32>,
  pub valid_until: DateTime<Utc>,
  pub terms: Option<String>,
  #[serde(default)]
  pub deposit_percentage: i32,
  pub delivery_time: Option<String>,
}

impl QuoteRequest {
  pub fn into_new_quote(self, supplier_id: Uuid) -> NewQuote {
    NewQuote {
      supplier_id,
      unit_price_cents: self.unit_price_cents,
      agreed_quantity: self.agreed_quantity,
      valid_until: self.valid_until,
      terms: self.terms,
      deposit_percentage: self.deposit_percentage,
      delivery_time: self.delivery_time,
    }
  }
}

#[derive(Clone)]
pub struct SubmitQuoteCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub now: DateTime<Utc>,
  pub rfq_id: Uuid,
  pub request: QuoteRequest,
  pub rfq: Option<Rfq>,
  pub log: Option<NegotiationLog>,
  pub quote: Option<Quote>,
  pub changes: ChangeSet,
}

/// Buyer accepts a pending quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptQuote;

#[derive(Debug, Clone, Deserialize)]
pub struct RejectQuote {
  pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterQuote {
  pub counter_price_cents: i64,
  pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviseQuote {
  #[serde(flatten)]
  pub revision: Revision,
}

/// Shared shape of accept, reject, counter and revise. `A` is the action and
/// makes each of them a distinct flow.
#[derive(Clone)]
pub struct NegotiationCtxData<A> {
  pub app_state: AppState,
  pub actor: Actor,
  pub now: DateTime<Utc>,
  pub quote_id: Uuid,
  pub action: A,
  pub rfq: Option<Rfq>,
  pub quote: Option<Quote>,
  /// Every other quote of the RFQ.
  pub siblings: Vec<Quote>,
  pub log: Option<NegotiationLog>,
  pub changes: ChangeSet,
  /// Who hears about the outcome.
  pub notify_user: Option<Uuid>,
}

impl<A> NegotiationCtxData<A> {
  pub fn new(app_state: AppState, actor: Actor, quote_id: Uuid, action: A) -> Self {
    let now = app_state.clock.now();
    Self {
      app_state,
      actor,
      now,
      quote_id,
      action,
      rfq: None,
      quote: None,
      siblings: Vec::new(),
      log: None,
      changes: ChangeSet::new(),
      notify_user: None,
    }
  }
}

// --- Checkout ---

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutLine {
  pub product_id: Uuid,
  pub quantity: i32,
}

/// Body of `POST /checkout`: either an accepted quote or catalogue lines.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
  pub quote_id: Option<Uuid>,
  #[serde(default)]
  pub lines: Vec<CheckoutLine>,
  #[serde(default)]
  pub payment_plan: PaymentPlan,
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub now: DateTime<Utc>,
  pub request: CheckoutRequest,
  pub idempotency_key: Option<String>,
  pub draft: Option<OrderDraft>,
  pub changes: ChangeSet,
  /// Set when the idempotency key matched an earlier order.
  pub replayed_order: Option<Order>,
  pub payment_intent: Option<PaymentIntent>,
}

impl std::fmt::Debug for CheckoutCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CheckoutCtxData")
      .field("actor", &self.actor)
      .field("now", &self.now)
      .field("request", &self.request)
      .field("idempotency_key", &self.idempotency_key)
      .field("draft", &self.draft)
      .field("changes", &self.changes)
      .field("replayed_order", &self.replayed_order)
      .field("payment_intent", &self.payment_intent)
      .finish_non_exhaustive()
  }
}

// --- Order operations ---

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AdvanceStatus {
  pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelOrder {
  pub reason: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmReceipt;

#[derive(Debug, Clone, Copy)]
pub enum DisputeAction {
  Open,
  Resolve,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IssueInvoice;

/// Shared shape of every operation on an existing order.
#[derive(Clone)]
pub struct OrderCtxData<A> {
  pub app_state: AppState,
  pub actor: Actor,
  pub now: DateTime<Utc>,
  pub order_id: Uuid,
  pub action: A,
  pub order: Option<Order>,
  pub items: Vec<OrderItem>,
  /// `false` skips persistence when the action turned out to be a no-op.
  pub changed: bool,
}

impl<A> OrderCtxData<A> {
  pub fn new(app_state: AppState, actor: Actor, order_id: Uuid, action: A) -> Self {
    let now = app_state.clock.now();
    Self {
      app_state,
      actor,
      now,
      order_id,
      action,
      order: None,
      items: Vec::new(),
      changed: false,
    }
  }
}

// --- Payment webhook ---

#[derive(Clone)]
pub struct PaymentWebhookCtxData {
  pub app_state: AppState,
  pub now: DateTime<Utc>,
  pub source: String,
  pub body: Vec<u8>,
  pub provided_secret: Option<String>,
  pub payload: Option<WebhookPayload>,
  pub order: Option<Order>,
  /// `false` for a replayed event.
  pub applied: bool,
}

// --- Address book ---

#[derive(Clone)]
pub struct UpsertAddressCtxData {
  pub app_state: AppState,
  pub actor: Actor,
  pub now: DateTime<Utc>,
  pub input: AddressInput,
  pub address: Option<Address>,
  /// The user's other default address when the book was read.
  pub replaces_default: Option<Uuid>,
}

// --- Admin sweeps ---

#[derive(Clone)]
pub struct ExpireRfqsCtxData {
  pub app_state: AppState,
  pub now: DateTime<Utc>,
  pub due: Vec<Rfq>,
  pub expired: Vec<Uuid>,
  pub skipped: Vec<Uuid>,
}

#[derive(Clone)]
pub struct ReleaseEscrowCtxData {
  pub app_state: AppState,
  pub now: DateTime<Utc>,
  pub due: Vec<Order>,
  pub released: Vec<Uuid>,
  pub skipped: Vec<Uuid>,
}
