// apps/marketplace/src/models/address.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Address {
  pub id: Uuid,
  pub user_id: Uuid,
  pub label: String,
  pub line1: String,
  pub line2: Option<String>,
  pub city: String,
  pub region: Option<String>,
  pub postal_code: String,
  pub country: String,
  pub phone: Option<String>,
  pub is_default: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Body of `PUT /addresses`. Without `id` a new address is created.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
  pub id: Option<Uuid>,
  pub label: String,
  pub line1: String,
  pub line2: Option<String>,
  pub city: String,
  pub region: Option<String>,
  pub postal_code: String,
  pub country: String,
  pub phone: Option<String>,
  #[serde(default)]
  pub is_default: bool,
}

fn required(field: &str, value: &str) -> AppResult<String> {
  let value = value.trim();
  if value.is_empty() {
    return Err(AppError::Validation(format!("address {} is required", field)));
  }
  Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Address {
  /// Validates `input` against the user's current address book.
  ///
  /// The first address of a user always becomes the default. Updating an
  /// address that belongs to someone else is reported as not found.
  pub fn from_input(user_id: Uuid, input: AddressInput, book: &[Address], now: DateTime<Utc>) -> AppResult<Self> {
    let existing = match input.id {
      Some(id) => Some(
        book
          .iter()
          .find(|a| a.id == id)
          .ok_or_else(|| AppError::NotFound(format!("Address {} not found", id)))?,
      ),
      None => None,
    };

    let country = required("country", &input.country)?.to_ascii_uppercase();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
      return Err(AppError::Validation(format!(
        "country must be a two-letter ISO code (got '{}')",
        country
      )));
    }

    let others_exist = book.iter().any(|a| Some(a.id) != input.id);
    // keeping the only default as default
    let is_default = input.is_default || !others_exist || existing.map(|a| a.is_default).unwrap_or(false);

    Ok(Self {
      id: existing.map(|a| a.id).unwrap_or_else(Uuid::new_v4),
      user_id,
      label: required("label", &input.label)?,
      line1: required("line1", &input.line1)?,
      line2: optional(input.line2),
      city: required("city", &input.city)?,
      region: optional(input.region),
      postal_code: required("postal_code", &input.postal_code)?,
      country,
      phone: optional(input.phone),
      is_default,
      created_at: existing.map(|a| a.created_at).unwrap_or(now),
      updated_at: now,
    })
  }
}
