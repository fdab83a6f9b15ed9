// apps/marketplace/src/db/memory.rs

//! In-memory store for tests and local runs.
//!
//! All tables sit behind one mutex. A commit applies its changes to a copy of
//! the tables and swaps it in only when every change and every uniqueness
//! rule passed, so a failed commit leaves nothing behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use tradeflow::{
  DisputeStatus, Order, OrderItem, OrderStatus, PaymentStatus, Quote, QuoteRevision, QuoteStatus, Rfq,
};

use crate::db::{Change, ChangeSet, MarketplaceStore, StoreError, StoreResult};
use crate::models::{Address, Product};

#[derive(Debug, Clone, Default)]
struct Tables {
  rfqs: HashMap<Uuid, Rfq>,
  quotes: HashMap<Uuid, Quote>,
  revisions: HashMap<Uuid, Vec<QuoteRevision>>,
  orders: HashMap<Uuid, Order>,
  order_items: HashMap<Uuid, Vec<OrderItem>>,
  products: HashMap<Uuid, Product>,
  addresses: HashMap<Uuid, Address>,
}

fn check_version(entity: &'static str, id: Uuid, stored: i32, incoming: i32) -> StoreResult<()> {
  if stored + 1 == incoming {
    Ok(())
  } else {
    Err(StoreError::conflict(
      entity,
      format!("{} {} is at version {}, update expected {}", entity, id, stored, incoming - 1),
    ))
  }
}

impl Tables {
  fn apply(&mut self, change: Change) -> StoreResult<()> {
    match change {
      Change::InsertRfq(rfq) => {
        if self.rfqs.contains_key(&rfq.id) {
          return Err(StoreError::conflict("rfq", format!("rfq {} already exists", rfq.id)));
        }
        self.rfqs.insert(rfq.id, rfq);
      }
      Change::UpdateRfq(rfq) => {
        let stored = self.rfqs.get(&rfq.id).ok_or_else(|| StoreError::not_found("rfq", rfq.id))?;
        check_version("rfq", rfq.id, stored.version, rfq.version)?;
        self.rfqs.insert(rfq.id, rfq);
      }
      Change::InsertQuote(quote) => {
        if !self.rfqs.contains_key(&quote.rfq_id) {
          return Err(StoreError::not_found("rfq", quote.rfq_id));
        }
        if self.quotes.contains_key(&quote.id) {
          return Err(StoreError::conflict("quote", format!("quote {} already exists", quote.id)));
        }
        self.quotes.insert(quote.id, quote);
      }
      Change::UpdateQuote(quote) => {
        let stored = self
          .quotes
          .get(&quote.id)
          .ok_or_else(|| StoreError::not_found("quote", quote.id))?;
        check_version("quote", quote.id, stored.version, quote.version)?;
        self.quotes.insert(quote.id, quote);
      }
      Change::AppendRevision(revision) => {
        let history = self.revisions.entry(revision.rfq_id).or_default();
        if history.iter().any(|r| r.seq == revision.seq) {
          return Err(StoreError::conflict(
            "quote_revision",
            format!("seq {} of RFQ {} already recorded", revision.seq, revision.rfq_id),
          ));
        }
        history.push(revision);
        history.sort_by_key(|r| r.seq);
      }
      Change::InsertOrder { order, items } => {
        if self.orders.contains_key(&order.id) {
          return Err(StoreError::conflict("order", format!("order {} already exists", order.id)));
        }
        if let Some(key) = order.idempotency_key.as_deref() {
          let taken = self
            .orders
            .values()
            .any(|o| o.user_id == order.user_id && o.idempotency_key.as_deref() == Some(key));
          if taken {
            return Err(StoreError::conflict("order", format!("idempotency key '{}' already used", key)));
          }
        }
        self.order_items.insert(order.id, items);
        self.orders.insert(order.id, order);
      }
      Change::UpdateOrder(order) => {
        let stored = self
          .orders
          .get(&order.id)
          .ok_or_else(|| StoreError::not_found("order", order.id))?;
        check_version("order", order.id, stored.version, order.version)?;
        self.orders.insert(order.id, order);
      }
      Change::ReserveStock { product_id, quantity } => {
        let product = self
          .products
          .get_mut(&product_id)
          .ok_or_else(|| StoreError::not_found("product", product_id))?;
        if product.stock_quantity < quantity {
          return Err(StoreError::conflict(
            "product",
            format!(
              "only {} units of {} left, {} requested",
              product.stock_quantity, product_id, quantity
            ),
          ));
        }
        product.stock_quantity -= quantity;
      }
      Change::UpsertAddress {
        address,
        replaces_default,
      } => {
        if let Some(stored) = self.addresses.get(&address.id) {
          if stored.user_id != address.user_id {
            return Err(StoreError::not_found("address", address.id));
          }
        }
        if address.is_default {
          let current = self
            .addresses
            .values()
            .find(|a| a.user_id == address.user_id && a.id != address.id && a.is_default)
            .map(|a| a.id);
          if current != replaces_default {
            return Err(StoreError::conflict(
              "address",
              format!("default address of user {} changed concurrently", address.user_id),
            ));
          }
          for other in self.addresses.values_mut() {
            if other.user_id == address.user_id && other.id != address.id {
              other.is_default = false;
            }
          }
        }
        self.addresses.insert(address.id, address);
      }
      Change::UpsertProduct { product, stock_delta } => match self.products.get_mut(&product.id) {
        Some(stored) => {
          if stored.supplier_id != product.supplier_id {
            return Err(StoreError::conflict(
              "product",
              format!("product {} belongs to another supplier", product.id),
            ));
          }
          let stock_quantity = stored.stock_quantity + stock_delta;
          if stock_quantity < 0 {
            return Err(StoreError::conflict(
              "product",
              format!("stock of {} would drop below zero", product.id),
            ));
          }
          *stored = Product {
            stock_quantity,
            created_at: stored.created_at,
            ..product
          };
        }
        None => {
          self.products.insert(product.id, product);
        }
      },
    }
    Ok(())
  }

  /// The partial unique indexes of the SQL schema.
  fn check_unique(&self) -> StoreResult<()> {
    let mut accepted = HashSet::new();
    for quote in self.quotes.values().filter(|q| q.status == QuoteStatus::Accepted) {
      if !accepted.insert(quote.rfq_id) {
        return Err(StoreError::conflict(
          "quote",
          format!("RFQ {} already has an accepted quote", quote.rfq_id),
        ));
      }
    }
    let mut defaults = HashSet::new();
    for address in self.addresses.values().filter(|a| a.is_default) {
      if !defaults.insert(address.user_id) {
        return Err(StoreError::conflict(
          "address",
          format!("user {} already has a default address", address.user_id),
        ));
      }
    }
    Ok(())
  }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
  rows.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
  rows
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
  async fn get_rfq(&self, id: Uuid) -> StoreResult<Rfq> {
    self
      .tables
      .lock()
      .rfqs
      .get(&id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("rfq", id))
  }

  async fn list_rfqs_for(&self, user_id: Uuid) -> StoreResult<Vec<Rfq>> {
    let rows = self
      .tables
      .lock()
      .rfqs
      .values()
      .filter(|r| r.is_participant(user_id))
      .cloned()
      .collect();
    Ok(newest_first(rows, |r: &Rfq| r.created_at))
  }

  async fn list_overdue_rfqs(&self, now: DateTime<Utc>) -> StoreResult<Vec<Rfq>> {
    let mut rows: Vec<Rfq> = self
      .tables
      .lock()
      .rfqs
      .values()
      .filter(|r| r.needs_expiry(now))
      .cloned()
      .collect();
    rows.sort_by_key(|r| r.expires_at);
    Ok(rows)
  }

  async fn get_quote(&self, id: Uuid) -> StoreResult<Quote> {
    self
      .tables
      .lock()
      .quotes
      .get(&id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("quote", id))
  }

  async fn list_quotes(&self, rfq_id: Uuid) -> StoreResult<Vec<Quote>> {
    let mut rows: Vec<Quote> = self
      .tables
      .lock()
      .quotes
      .values()
      .filter(|q| q.rfq_id == rfq_id)
      .cloned()
      .collect();
    rows.sort_by_key(|q| q.created_at);
    Ok(rows)
  }

  async fn list_revisions(&self, rfq_id: Uuid) -> StoreResult<Vec<QuoteRevision>> {
    Ok(self.tables.lock().revisions.get(&rfq_id).cloned().unwrap_or_default())
  }

  async fn get_order(&self, id: Uuid) -> StoreResult<Order> {
    self
      .tables
      .lock()
      .orders
      .get(&id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("order", id))
  }

  async fn list_order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
    Ok(self.tables.lock().order_items.get(&order_id).cloned().unwrap_or_default())
  }

  async fn list_orders_for(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
    let tables = self.tables.lock();
    let rows = tables
      .orders
      .values()
      .filter(|o| {
        o.user_id == user_id
          || tables
            .order_items
            .get(&o.id)
            .map(|items| items.iter().any(|i| i.supplier_id == Some(user_id)))
            .unwrap_or(false)
      })
      .cloned()
      .collect();
    Ok(newest_first(rows, |o: &Order| o.created_at))
  }

  async fn find_order_by_idempotency_key(&self, user_id: Uuid, key: &str) -> StoreResult<Option<Order>> {
    Ok(
      self
        .tables
        .lock()
        .orders
        .values()
        .find(|o| o.user_id == user_id && o.idempotency_key.as_deref() == Some(key))
        .cloned(),
    )
  }

  async fn list_escrow_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Order>> {
    let mut rows: Vec<Order> = self
      .tables
      .lock()
      .orders
      .values()
      .filter(|o| {
        o.status == OrderStatus::Delivered
          && o.payment_status == PaymentStatus::EscrowHold
          && o.dispute_status != DisputeStatus::Open
          && o.escrow_release_deadline.map(|d| d <= now).unwrap_or(false)
      })
      .cloned()
      .collect();
    rows.sort_by_key(|o| o.escrow_release_deadline);
    Ok(rows)
  }

  async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
    self
      .tables
      .lock()
      .products
      .get(&id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("product", id))
  }

  async fn list_products(&self) -> StoreResult<Vec<Product>> {
    let mut rows: Vec<Product> = self.tables.lock().products.values().cloned().collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(rows)
  }

  async fn list_addresses(&self, user_id: Uuid) -> StoreResult<Vec<Address>> {
    let mut rows: Vec<Address> = self
      .tables
      .lock()
      .addresses
      .values()
      .filter(|a| a.user_id == user_id)
      .cloned()
      .collect();
    // default first, then oldest
    rows.sort_by_key(|a| (!a.is_default, a.created_at));
    Ok(rows)
  }

  async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
    let mut tables = self.tables.lock();
    let mut working = tables.clone();
    for change in changes.into_changes() {
      working.apply(change)?;
    }
    working.check_unique()?;
    *tables = working;
    Ok(())
  }
}
