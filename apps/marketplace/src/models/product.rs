// apps/marketplace/src/models/product.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use tradeflow::DirectLine;

use crate::errors::{AppError, Result as AppResult};

/// Body of `PUT /products`; the supplier is the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
  pub id: Option<Uuid>,
  pub name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  #[serde(default = "default_min_order_quantity")]
  pub min_order_quantity: i32,
  #[serde(default)]
  pub stock_quantity: i32,
}

fn default_min_order_quantity() -> i32 {
  1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub supplier_id: Uuid,
  pub name: String,
  pub description: Option<String>,
  pub price_cents: i64,
  pub min_order_quantity: i32,
  pub stock_quantity: i32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Product {
  /// Checkout line for `quantity` units at the current catalogue price.
  pub fn line(&self, quantity: i32) -> DirectLine {
    DirectLine {
      product_id: self.id,
      supplier_id: Some(self.supplier_id),
      quantity,
      unit_price_cents: self.price_cents,
      min_order_quantity: self.min_order_quantity,
      stock_quantity: self.stock_quantity,
    }
  }

  /// Validates a catalogue entry of `supplier_id`. `existing` is the stored
  /// product when `input.id` names one; it must belong to the same supplier.
  pub fn from_input(
    supplier_id: Uuid,
    input: ProductInput,
    existing: Option<&Product>,
    now: DateTime<Utc>,
  ) -> AppResult<Self> {
    if let Some(existing) = existing {
      if existing.supplier_id != supplier_id {
        return Err(AppError::Forbidden(format!(
          "Product {} belongs to another supplier",
          existing.id
        )));
      }
    }
    let name = input.name.trim().to_string();
    if name.is_empty() {
      return Err(AppError::Validation("name is required".to_string()));
    }
    if input.price_cents <= 0 {
      return Err(AppError::Validation(format!(
        "price must be positive (got {})",
        input.price_cents
      )));
    }
    if input.min_order_quantity < 1 || input.stock_quantity < 0 {
      return Err(AppError::Validation(
        "minimum order quantity must be at least 1 and stock cannot be negative".to_string(),
      ));
    }
    Ok(Self {
      id: existing.map(|p| p.id).or(input.id).unwrap_or_else(Uuid::new_v4),
      supplier_id,
      name,
      description: input.description.filter(|d| !d.trim().is_empty()),
      price_cents: input.price_cents,
      min_order_quantity: input.min_order_quantity,
      stock_quantity: input.stock_quantity,
      created_at: existing.map(|p| p.created_at).unwrap_or(now),
      updated_at: now,
    })
  }
}
