// apps/marketplace/src/db/postgres.rs

//! sqlx/Postgres store. Each commit runs in one transaction; a version
//! mismatch or unique violation rolls the whole change set back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use tradeflow::{Order, OrderItem, Quote, QuoteRevision, Rfq};

use crate::db::{Change, ChangeSet, MarketplaceStore, StoreError, StoreResult};
use crate::models::{Address, Product};

const RFQ_COLUMNS: &str = "id, buyer_id, supplier_id, product_id, quantity, target_price_cents, delivery_location, \
   notes, attachments, status, expires_at, created_at, updated_at, version";

const QUOTE_COLUMNS: &str = "id, rfq_id, supplier_id, unit_price_cents, total_price_cents, valid_until, terms, status, \
   counter_price_cents, counter_note, agreed_quantity, deposit_percentage, delivery_time, rejection_reason, revision, \
   created_at, updated_at, version";

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.rfq_id, o.quote_id, o.total_amount_cents, o.status, o.payment_status, \
   o.payment_plan, o.payment_method, o.transaction_id, o.deposit_amount_cents, o.balance_due_cents, o.deposit_paid_at, \
   o.full_payment_paid_at, o.escrow_released_at, o.escrow_release_deadline, o.delivered_at, o.dispute_status, \
   o.cancellation_reason, o.cancelled_at, o.invoice_url, o.invoice_generated_at, o.idempotency_key, o.created_at, \
   o.updated_at, o.version";

const PRODUCT_COLUMNS: &str =
  "id, supplier_id, name, description, price_cents, min_order_quantity, stock_quantity, created_at, updated_at";

const ADDRESS_COLUMNS: &str = "id, user_id, label, line1, line2, city, region, postal_code, country, phone, \
   is_default, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
  pool: PgPool,
}

/// Unique violations become conflicts; everything else stays a database error.
fn write_error(entity: &'static str, err: sqlx::Error) -> StoreError {
  if let sqlx::Error::Database(db_err) = &err {
    if db_err.is_unique_violation() {
      return StoreError::conflict(entity, db_err.message().to_string());
    }
  }
  StoreError::Sqlx(err)
}

fn expect_one_row(entity: &'static str, id: Uuid, expected_version: i32, rows: u64) -> StoreResult<()> {
  if rows == 1 {
    Ok(())
  } else {
    Err(StoreError::conflict(
      entity,
      format!("{} {} is no longer at version {}", entity, id, expected_version),
    ))
  }
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> StoreResult<Self> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    info!("Successfully connected to the database.");
    Ok(Self::new(pool))
  }

  pub async fn run_migrations(&self) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| StoreError::Sqlx(e.into()))?;
    info!("Database migrations applied.");
    Ok(())
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  async fn apply(conn: &mut PgConnection, change: Change) -> StoreResult<()> {
    match change {
      Change::InsertRfq(rfq) => {
        sqlx::query(
          "INSERT INTO rfqs (id, buyer_id, supplier_id, product_id, quantity, target_price_cents, delivery_location, \
           notes, attachments, status, expires_at, created_at, updated_at, version) \
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(rfq.id)
        .bind(rfq.buyer_id)
        .bind(rfq.supplier_id)
        .bind(rfq.product_id)
        .bind(rfq.quantity)
        .bind(rfq.target_price_cents)
        .bind(&rfq.delivery_location)
        .bind(&rfq.notes)
        .bind(&rfq.attachments)
        .bind(rfq.status.as_str())
        .bind(rfq.expires_at)
        .bind(rfq.created_at)
        .bind(rfq.updated_at)
        .bind(rfq.version)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("rfq", e))?;
      }
      Change::UpdateRfq(rfq) => {
        let result = sqlx::query(
          "UPDATE rfqs SET status = $2, notes = $3, expires_at = $4, updated_at = $5, version = $6 \
           WHERE id = $1 AND version = $7",
        )
        .bind(rfq.id)
        .bind(rfq.status.as_str())
        .bind(&rfq.notes)
        .bind(rfq.expires_at)
        .bind(rfq.updated_at)
        .bind(rfq.version)
        .bind(rfq.version - 1)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("rfq", e))?;
        expect_one_row("rfq", rfq.id, rfq.version - 1, result.rows_affected())?;
      }
      Change::InsertQuote(quote) => {
        sqlx::query(
          "INSERT INTO quotes (id, rfq_id, supplier_id, unit_price_cents, total_price_cents, valid_until, terms, status, \
           counter_price_cents, counter_note, agreed_quantity, deposit_percentage, delivery_time, rejection_reason, \
           revision, created_at, updated_at, version) \
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(quote.id)
        .bind(quote.rfq_id)
        .bind(quote.supplier_id)
        .bind(quote.unit_price_cents)
        .bind(quote.total_price_cents)
        .bind(quote.valid_until)
        .bind(&quote.terms)
        .bind(quote.status.as_str())
        .bind(quote.counter_price_cents)
        .bind(&quote.counter_note)
        .bind(quote.agreed_quantity)
        .bind(quote.deposit_percentage)
        .bind(&quote.delivery_time)
        .bind(&quote.rejection_reason)
        .bind(quote.revision)
        .bind(quote.created_at)
        .bind(quote.updated_at)
        .bind(quote.version)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("quote", e))?;
      }
      Change::UpdateQuote(quote) => {
        let result = sqlx::query(
          "UPDATE quotes SET unit_price_cents = $2, total_price_cents = $3, valid_until = $4, terms = $5, status = $6, \
           counter_price_cents = $7, counter_note = $8, agreed_quantity = $9, delivery_time = $10, \
           rejection_reason = $11, revision = $12, updated_at = $13, version = $14 \
           WHERE id = $1 AND version = $15",
        )
        .bind(quote.id)
        .bind(quote.unit_price_cents)
        .bind(quote.total_price_cents)
        .bind(quote.valid_until)
        .bind(&quote.terms)
        .bind(quote.status.as_str())
        .bind(quote.counter_price_cents)
        .bind(&quote.counter_note)
        .bind(quote.agreed_quantity)
        .bind(&quote.delivery_time)
        .bind(&quote.rejection_reason)
        .bind(quote.revision)
        .bind(quote.updated_at)
        .bind(quote.version)
        .bind(quote.version - 1)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("quote", e))?;
        expect_one_row("quote", quote.id, quote.version - 1, result.rows_affected())?;
      }
      Change::AppendRevision(revision) => {
        sqlx::query(
          "INSERT INTO quote_revisions (rfq_id, seq, quote_id, kind, unit_price_cents, quantity, note, actor_id, \
           created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(revision.rfq_id)
        .bind(revision.seq)
        .bind(revision.quote_id)
        .bind(revision.kind.as_str())
        .bind(revision.unit_price_cents)
        .bind(revision.quantity)
        .bind(&revision.note)
        .bind(revision.actor_id)
        .bind(revision.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("quote_revision", e))?;
      }
      Change::InsertOrder { order, items } => {
        sqlx::query(
          "INSERT INTO orders (id, user_id, rfq_id, quote_id, total_amount_cents, status, payment_status, payment_plan, \
           payment_method, transaction_id, deposit_amount_cents, balance_due_cents, dispute_status, idempotency_key, \
           created_at, updated_at, version) \
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.rfq_id)
        .bind(order.quote_id)
        .bind(order.total_amount_cents)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_plan.as_str())
        .bind(&order.payment_method)
        .bind(&order.transaction_id)
        .bind(order.deposit_amount_cents)
        .bind(order.balance_due_cents)
        .bind(order.dispute_status.as_str())
        .bind(&order.idempotency_key)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("order", e))?;

        if !items.is_empty() {
          let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO order_items (id, order_id, product_id, supplier_id, quantity, unit_price_cents) ",
          );
          builder.push_values(items.iter(), |mut row, item| {
            row
              .push_bind(item.id)
              .push_bind(item.order_id)
              .push_bind(item.product_id)
              .push_bind(item.supplier_id)
              .push_bind(item.quantity)
              .push_bind(item.unit_price_cents);
          });
          builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| write_error("order_item", e))?;
        }
      }
      Change::UpdateOrder(order) => {
        let result = sqlx::query(
          "UPDATE orders SET status = $2, payment_status = $3, payment_method = $4, transaction_id = $5, \
           deposit_paid_at = $6, full_payment_paid_at = $7, escrow_released_at = $8, escrow_release_deadline = $9, \
           delivered_at = $10, dispute_status = $11, cancellation_reason = $12, cancelled_at = $13, invoice_url = $14, \
           invoice_generated_at = $15, updated_at = $16, version = $17 \
           WHERE id = $1 AND version = $18",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_method)
        .bind(&order.transaction_id)
        .bind(order.deposit_paid_at)
        .bind(order.full_payment_paid_at)
        .bind(order.escrow_released_at)
        .bind(order.escrow_release_deadline)
        .bind(order.delivered_at)
        .bind(order.dispute_status.as_str())
        .bind(&order.cancellation_reason)
        .bind(order.cancelled_at)
        .bind(&order.invoice_url)
        .bind(order.invoice_generated_at)
        .bind(order.updated_at)
        .bind(order.version)
        .bind(order.version - 1)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("order", e))?;
        expect_one_row("order", order.id, order.version - 1, result.rows_affected())?;
      }
      Change::ReserveStock { product_id, quantity } => {
        let result = sqlx::query(
          "UPDATE products SET stock_quantity = stock_quantity - $2, updated_at = now() \
           WHERE id = $1 AND stock_quantity >= $2",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() != 1 {
          return Err(StoreError::conflict(
            "product",
            format!("not enough stock of {} for {} units", product_id, quantity),
          ));
        }
      }
      Change::UpsertAddress {
        address,
        replaces_default,
      } => {
        if address.is_default {
          let unset: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE addresses SET is_default = FALSE, updated_at = $3 \
             WHERE user_id = $1 AND id <> $2 AND is_default RETURNING id",
          )
          .bind(address.user_id)
          .bind(address.id)
          .bind(address.updated_at)
          .fetch_all(&mut *conn)
          .await?;
          if unset.first().copied() != replaces_default || unset.len() > 1 {
            return Err(StoreError::conflict(
              "address",
              format!("default address of user {} changed concurrently", address.user_id),
            ));
          }
        }
        let result = sqlx::query(
          "INSERT INTO addresses (id, user_id, label, line1, line2, city, region, postal_code, country, phone, \
           is_default, created_at, updated_at) \
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
           ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label, line1 = EXCLUDED.line1, line2 = EXCLUDED.line2, \
           city = EXCLUDED.city, region = EXCLUDED.region, postal_code = EXCLUDED.postal_code, \
           country = EXCLUDED.country, phone = EXCLUDED.phone, is_default = EXCLUDED.is_default, \
           updated_at = EXCLUDED.updated_at \
           WHERE addresses.user_id = EXCLUDED.user_id",
        )
        .bind(address.id)
        .bind(address.user_id)
        .bind(&address.label)
        .bind(&address.line1)
        .bind(&address.line2)
        .bind(&address.city)
        .bind(&address.region)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .bind(address.is_default)
        .bind(address.created_at)
        .bind(address.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("address", e))?;
        if result.rows_affected() != 1 {
          return Err(StoreError::not_found("address", address.id));
        }
      }
      Change::UpsertProduct { product, stock_delta } => {
        let result = sqlx::query(
          "INSERT INTO products (id, supplier_id, name, description, price_cents, min_order_quantity, stock_quantity, \
           created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
           ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description, \
           price_cents = EXCLUDED.price_cents, min_order_quantity = EXCLUDED.min_order_quantity, \
           stock_quantity = products.stock_quantity + $10, updated_at = EXCLUDED.updated_at \
           WHERE products.supplier_id = EXCLUDED.supplier_id AND products.stock_quantity + $10 >= 0",
        )
        .bind(product.id)
        .bind(product.supplier_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.min_order_quantity)
        .bind(product.stock_quantity)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(stock_delta)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error("product", e))?;
        if result.rows_affected() != 1 {
          return Err(StoreError::conflict(
            "product",
            format!("product {} belongs to another supplier or its stock would drop below zero", product.id),
          ));
        }
      }
    }
    Ok(())
  }
}

#[async_trait]
impl MarketplaceStore for PgStore {
  async fn get_rfq(&self, id: Uuid) -> StoreResult<Rfq> {
    sqlx::query_as::<_, Rfq>(&format!("SELECT {} FROM rfqs WHERE id = $1", RFQ_COLUMNS))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| StoreError::not_found("rfq", id))
  }

  async fn list_rfqs_for(&self, user_id: Uuid) -> StoreResult<Vec<Rfq>> {
    Ok(
      sqlx::query_as::<_, Rfq>(&format!(
        "SELECT {} FROM rfqs WHERE buyer_id = $1 OR supplier_id = $1 ORDER BY created_at DESC",
        RFQ_COLUMNS
      ))
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn list_overdue_rfqs(&self, now: DateTime<Utc>) -> StoreResult<Vec<Rfq>> {
    Ok(
      sqlx::query_as::<_, Rfq>(&format!(
        "SELECT {} FROM rfqs WHERE status IN ('pending', 'quoted') AND expires_at < $1 ORDER BY expires_at",
        RFQ_COLUMNS
      ))
      .bind(now)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn get_quote(&self, id: Uuid) -> StoreResult<Quote> {
    sqlx::query_as::<_, Quote>(&format!("SELECT {} FROM quotes WHERE id = $1", QUOTE_COLUMNS))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| StoreError::not_found("quote", id))
  }

  async fn list_quotes(&self, rfq_id: Uuid) -> StoreResult<Vec<Quote>> {
    Ok(
      sqlx::query_as::<_, Quote>(&format!(
        "SELECT {} FROM quotes WHERE rfq_id = $1 ORDER BY created_at",
        QUOTE_COLUMNS
      ))
      .bind(rfq_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn list_revisions(&self, rfq_id: Uuid) -> StoreResult<Vec<QuoteRevision>> {
    Ok(
      sqlx::query_as::<_, QuoteRevision>(
        "SELECT rfq_id, seq, quote_id, kind, unit_price_cents, quantity, note, actor_id, created_at \
         FROM quote_revisions WHERE rfq_id = $1 ORDER BY seq",
      )
      .bind(rfq_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn get_order(&self, id: Uuid) -> StoreResult<Order> {
    sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders o WHERE o.id = $1", ORDER_COLUMNS))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| StoreError::not_found("order", id))
  }

  async fn list_order_items(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
    Ok(
      sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, product_id, supplier_id, quantity, unit_price_cents \
         FROM order_items WHERE order_id = $1 ORDER BY id",
      )
      .bind(order_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn list_orders_for(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders o WHERE o.user_id = $1 \
         OR EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.supplier_id = $1) \
         ORDER BY o.created_at DESC",
        ORDER_COLUMNS
      ))
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn find_order_by_idempotency_key(&self, user_id: Uuid, key: &str) -> StoreResult<Option<Order>> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders o WHERE o.user_id = $1 AND o.idempotency_key = $2",
        ORDER_COLUMNS
      ))
      .bind(user_id)
      .bind(key)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn list_escrow_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Order>> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders o WHERE o.status = 'delivered' AND o.payment_status = 'escrow_hold' \
         AND o.dispute_status <> 'open' AND o.escrow_release_deadline <= $1 \
         ORDER BY o.escrow_release_deadline",
        ORDER_COLUMNS
      ))
      .bind(now)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn get_product(&self, id: Uuid) -> StoreResult<Product> {
    sqlx::query_as::<_, Product>(&format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| StoreError::not_found("product", id))
  }

  async fn list_products(&self) -> StoreResult<Vec<Product>> {
    Ok(
      sqlx::query_as::<_, Product>(&format!("SELECT {} FROM products ORDER BY name", PRODUCT_COLUMNS))
        .fetch_all(&self.pool)
        .await?,
    )
  }

  async fn list_addresses(&self, user_id: Uuid) -> StoreResult<Vec<Address>> {
    Ok(
      sqlx::query_as::<_, Address>(&format!(
        "SELECT {} FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at",
        ADDRESS_COLUMNS
      ))
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  #[instrument(name = "store::commit", skip(self, changes), fields(changes = changes.len()))]
  async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
    if changes.is_empty() {
      return Ok(());
    }
    let mut tx = self.pool.begin().await?;
    for change in changes.into_changes() {
      // dropping `tx` on error rolls back
      Self::apply(&mut tx, change).await?;
    }
    tx.commit().await?;
    debug!("Change set committed.");
    Ok(())
  }
}
