// apps/marketplace/src/db/mod.rs

//! Persistence boundary of the marketplace.
//!
//! Reads go through [`MarketplaceStore`]; every write goes through
//! [`MarketplaceStore::commit`] with a [`ChangeSet`], which is applied
//! atomically. Updates carry the version the caller read, so a concurrent
//! writer that got there first turns the commit into [`StoreError::Conflict`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use tradeflow::{Order, OrderItem, Quote, QuoteRevision, Rfq};

use crate::models::{Address, Product};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{entity} {id} not found")]
  NotFound { entity: &'static str, id: String },

  /// Stale version, unique constraint or stock check lost to a concurrent write.
  #[error("Conflicting write on {entity}: {detail}")]
  Conflict { entity: &'static str, detail: String },

  #[error("Database error: {0}")]
  Sqlx(#[from] sqlx::Error),
}

impl StoreError {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    StoreError::NotFound {
      entity,
      id: id.to_string(),
    }
  }

  pub fn conflict(entity: &'static str, detail: impl Into<String>) -> Self {
    StoreError::Conflict {
      entity,
      detail: detail.into(),
    }
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One write. `Update*` variants hold the entity with its version already
/// bumped; the store checks the row still carries `version - 1`.
#[derive(Debug, Clone)]
pub enum Change {
  InsertRfq(Rfq),
  UpdateRfq(Rfq),
  InsertQuote(Quote),
  UpdateQuote(Quote),
  AppendRevision(QuoteRevision),
  InsertOrder { order: Order, items: Vec<OrderItem> },
  UpdateOrder(Order),
  /// Decrements stock; fails with a conflict when too little is left.
  ReserveStock { product_id: Uuid, quantity: i32 },
  /// Inserts or updates an address. With `is_default` set, the user's other
  /// addresses lose their default flag in the same commit, provided the
  /// default being replaced is still `replaces_default`.
  UpsertAddress {
    address: Address,
    replaces_default: Option<Uuid>,
  },
  /// Inserts a product, or updates one of the same supplier. Stock of an
  /// existing row moves by `stock_delta` and may not go negative.
  UpsertProduct { product: Product, stock_delta: i32 },
}

/// Writes that must land together or not at all.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
  changes: Vec<Change>,
}

impl ChangeSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, change: Change) -> &mut Self {
    self.changes.push(change);
    self
  }

  pub fn insert_rfq(&mut self, rfq: &Rfq) -> &mut Self {
    self.push(Change::InsertRfq(rfq.clone()))
  }

  /// Bumps `rfq.version` and queues the update.
  pub fn update_rfq(&mut self, rfq: &mut Rfq) -> &mut Self {
    rfq.version += 1;
    self.push(Change::UpdateRfq(rfq.clone()))
  }

  pub fn insert_quote(&mut self, quote: &Quote) -> &mut Self {
    self.push(Change::InsertQuote(quote.clone()))
  }

  pub fn update_quote(&mut self, quote: &mut Quote) -> &mut Self {
    quote.version += 1;
    self.push(Change::UpdateQuote(quote.clone()))
  }

  pub fn append_revision(&mut self, revision: QuoteRevision) -> &mut Self {
    self.push(Change::AppendRevision(revision))
  }

  pub fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> &mut Self {
    self.push(Change::InsertOrder {
      order: order.clone(),
      items: items.to_vec(),
    })
  }

  pub fn update_order(&mut self, order: &mut Order) -> &mut Self {
    order.version += 1;
    self.push(Change::UpdateOrder(order.clone()))
  }

  pub fn reserve_stock(&mut self, product_id: Uuid, quantity: i32) -> &mut Self {
    self.push(Change::ReserveStock { product_id, quantity })
  }

  /// `replaces_default` is the user's other default address as read before
  /// building `address`.
  pub fn upsert_address(&mut self, address: &Address, replaces_default: Option<Uuid>) -> &mut Self {
    self.push(Change::UpsertAddress {
      address: address.clone(),
      replaces_default,
    })
  }

  /// `previous` is the row as read before building `product`; the stock
  /// change is written relative to it.
  pub fn upsert_product(&mut self, product: &Product, previous: Option<&Product>) -> &mut Self {
    let stock_delta = product.stock_quantity - previous.map(|p| p.stock_quantity).unwrap_or(0);
    self.push(Change::UpsertProduct {
      product: product.clone(),
      stock_delta,
    })
  }

  pub fn is_empty(&self) -> bool {
    self.changes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.changes.len()
  }

  pub fn changes(&self) -> &[Change] {
    &self.changes
  }

  pub fn into_changes(self) -> Vec<Change> {
    self.changes
  }
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
  async fn get_rfq(&self, id: Uuid) -> StoreResult<Rfq>;

  /// RFQs where `user_id` is the buyer or the supplier, newest first.
  async fn list_rfqs_for(&self, user_id: Uuid) -> StoreResult<Vec<Rfq>>;

  /// Pending or quoted RFQs whose expiry lies strictly before `now`.
  async fn list_overdue_rfqs(&self, now: DateTime<Utc>) -> StoreResult<Vec<Rfq>>;

  async fn get_quote(&self, id: Uuid) -> StoreResult<Quote>;

  /// Quotes of an RFQ, oldest first.
  async fn list_quotes(&self, rfq_id: Uuid) -> StoreResult<Vec<Quote>>;

  /// Negotiation history of an RFQ ordered by `seq`.
  async fn list_revisions(&self, rfq_id: Uuid) -> StoreResult<Vec<QuoteRevision>>;

  async fn get_order(&self, id: Uuid) -> StoreResult<Order>;

  async fn list_order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;

  /// Orders placed by `buyer_id` or containing an item of `supplier_id`,
  /// newest first.
  async fn list_orders_for(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;

  async fn find_order_by_idempotency_key(&self, user_id: Uuid, key: &str) -> StoreResult<Option<Order>>;

  /// Delivered escrow orders whose release deadline is at or before `now`
  /// and that have no open dispute.
  async fn list_escrow_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Order>>;

  async fn get_product(&self, id: Uuid) -> StoreResult<Product>;

  async fn list_products(&self) -> StoreResult<Vec<Product>>;

  async fn list_addresses(&self, user_id: Uuid) -> StoreResult<Vec<Address>>;

  /// Applies every change of `changes` atomically.
  async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}
