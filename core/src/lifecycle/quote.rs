// tradeflow/src/lifecycle/quote.rs

//! A supplier's priced response to an RFQ and the buyer/supplier negotiation
//! around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::expiry::{is_expired, Expiring};
use crate::lifecycle::machine::{wire_names, Lifecycle};
use crate::lifecycle::money::line_total;
use crate::lifecycle::rfq::{Rfq, RfqStatus};

pub const SIBLING_ACCEPTED_REASON: &str = "another quote was accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
  Pending,
  Accepted,
  Rejected,
  Countered,
}

wire_names!(QuoteStatus, "quote", {
  Pending => "pending",
  Accepted => "accepted",
  Rejected => "rejected",
  Countered => "countered",
});

impl Lifecycle for QuoteStatus {
  const ENTITY: &'static str = "quote";
  const ALL: &'static [Self] = Self::VARIANTS;

  fn allowed_next(self) -> &'static [Self] {
    use QuoteStatus::*;
    match self {
      Pending => &[Accepted, Rejected, Countered],
      // supplier revision puts the quote back in front of the buyer
      Countered => &[Pending, Rejected],
      Accepted | Rejected => &[],
    }
  }

  fn name(self) -> &'static str {
    self.as_str()
  }
}

/// Supplier input for a new quote. The total is always derived.
#[derive(Debug, Clone, Deserialize)]
pub struct NewQuote {
  pub supplier_id: Uuid,
  pub unit_price_cents: i64,
  pub agreed_quantity: Option<i32>,
  pub valid_until: DateTime<Utc>,
  pub terms: Option<String>,
  #[serde(default)]
  pub deposit_percentage: i32,
  pub delivery_time: Option<String>,
}

/// Supplier response to a counter offer.
#[derive(Debug, Clone, Deserialize)]
pub struct Revision {
  pub unit_price_cents: i64,
  pub agreed_quantity: Option<i32>,
  pub valid_until: Option<DateTime<Utc>>,
  pub terms: Option<String>,
  pub delivery_time: Option<String>,
  pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Quote {
  pub id: Uuid,
  pub rfq_id: Uuid,
  pub supplier_id: Uuid,
  pub unit_price_cents: i64,
  pub total_price_cents: i64,
  pub valid_until: DateTime<Utc>,
  pub terms: Option<String>,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub status: QuoteStatus,
  pub counter_price_cents: Option<i64>,
  pub counter_note: Option<String>,
  pub agreed_quantity: i32,
  pub deposit_percentage: i32,
  pub delivery_time: Option<String>,
  pub rejection_reason: Option<String>,
  pub revision: i32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub version: i32,
}

impl Expiring for Quote {
  fn expires_at(&self) -> DateTime<Utc> {
    self.valid_until
  }
}

impl Quote {
  pub fn new(input: NewQuote, rfq: &Rfq, now: DateTime<Utc>) -> LifecycleResult<Self> {
    if input.supplier_id != rfq.supplier_id {
      return Err(LifecycleError::NotParty {
        entity: RfqStatus::ENTITY,
        id: rfq.id,
        user_id: input.supplier_id,
      });
    }
    rfq.ensure_open_for_quotes(now)?;
    if input.unit_price_cents <= 0 {
      return Err(LifecycleError::Validation(format!(
        "unit price must be positive (got {})",
        input.unit_price_cents
      )));
    }
    if !(0..=100).contains(&input.deposit_percentage) {
      return Err(LifecycleError::Validation(format!(
        "deposit percentage must be between 0 and 100 (got {})",
        input.deposit_percentage
      )));
    }
    if input.valid_until <= now {
      return Err(LifecycleError::Validation("quote validity must lie in the future".to_string()));
    }

    let agreed_quantity = input.agreed_quantity.unwrap_or(rfq.quantity);
    let total_price_cents = line_total(input.unit_price_cents, agreed_quantity)?;

    Ok(Self {
      id: Uuid::new_v4(),
      rfq_id: rfq.id,
      supplier_id: input.supplier_id,
      unit_price_cents: input.unit_price_cents,
      total_price_cents,
      valid_until: input.valid_until,
      terms: input.terms,
      status: QuoteStatus::Pending,
      counter_price_cents: None,
      counter_note: None,
      agreed_quantity,
      deposit_percentage: input.deposit_percentage,
      delivery_time: input.delivery_time,
      rejection_reason: None,
      revision: 1,
      created_at: now,
      updated_at: now,
      version: 1,
    })
  }

  /// Pending or countered: still open to negotiation.
  pub fn is_live(&self) -> bool {
    matches!(self.status, QuoteStatus::Pending | QuoteStatus::Countered)
  }

  fn apply(&mut self, next: QuoteStatus, now: DateTime<Utc>) -> LifecycleResult<()> {
    self.status = self.status.transition(next)?;
    self.updated_at = now;
    Ok(())
  }

  fn ensure_belongs_to(&self, rfq: &Rfq) -> LifecycleResult<()> {
    if self.rfq_id == rfq.id {
      Ok(())
    } else {
      Err(LifecycleError::Validation(format!(
        "quote {} does not belong to RFQ {}",
        self.id, rfq.id
      )))
    }
  }

  fn ensure_not_expired(&self, now: DateTime<Utc>) -> LifecycleResult<()> {
    if is_expired(self, now) {
      Err(LifecycleError::Expired {
        entity: QuoteStatus::ENTITY,
        id: self.id,
      })
    } else {
      Ok(())
    }
  }

  /// Buyer acceptance. Fails when the quote or the RFQ has expired, when the
  /// RFQ already has an accepted quote, or when this quote is not pending.
  pub fn accept(&mut self, rfq: &Rfq, now: DateTime<Utc>) -> LifecycleResult<()> {
    self.ensure_belongs_to(rfq)?;
    rfq.ensure_quote_acceptable(now)?;
    self.ensure_not_expired(now)?;
    self.apply(QuoteStatus::Accepted, now)
  }

  pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> LifecycleResult<()> {
    let reason = reason.trim();
    if reason.is_empty() {
      return Err(LifecycleError::Validation("a rejection reason is required".to_string()));
    }
    self.apply(QuoteStatus::Rejected, now)?;
    self.rejection_reason = Some(reason.to_string());
    Ok(())
  }

  /// Buyer counter offer on a pending quote.
  pub fn counter(
    &mut self,
    rfq: &Rfq,
    counter_price_cents: i64,
    note: Option<String>,
    now: DateTime<Utc>,
  ) -> LifecycleResult<()> {
    self.ensure_belongs_to(rfq)?;
    if counter_price_cents <= 0 {
      return Err(LifecycleError::Validation(format!(
        "counter price must be positive (got {counter_price_cents})"
      )));
    }
    rfq.ensure_quote_acceptable(now)?;
    self.ensure_not_expired(now)?;
    self.apply(QuoteStatus::Countered, now)?;
    self.counter_price_cents = Some(counter_price_cents);
    self.counter_note = note.filter(|n| !n.trim().is_empty());
    Ok(())
  }

  /// Supplier revision after a counter. Reprices the quote, bumps `revision`
  /// and puts it back to pending.
  pub fn revise(&mut self, rfq: &Rfq, revision: Revision, now: DateTime<Utc>) -> LifecycleResult<()> {
    self.ensure_belongs_to(rfq)?;
    rfq.ensure_quote_acceptable(now)?;
    if revision.unit_price_cents <= 0 {
      return Err(LifecycleError::Validation(format!(
        "unit price must be positive (got {})",
        revision.unit_price_cents
      )));
    }
    let valid_until = revision.valid_until.unwrap_or(self.valid_until);
    if valid_until <= now {
      return Err(LifecycleError::Validation(
        "revised quote validity must lie in the future".to_string(),
      ));
    }
    let agreed_quantity = revision.agreed_quantity.unwrap_or(self.agreed_quantity);
    let total_price_cents = line_total(revision.unit_price_cents, agreed_quantity)?;

    self.apply(QuoteStatus::Pending, now)?;
    self.unit_price_cents = revision.unit_price_cents;
    self.agreed_quantity = agreed_quantity;
    self.total_price_cents = total_price_cents;
    self.valid_until = valid_until;
    if revision.terms.is_some() {
      self.terms = revision.terms;
    }
    if revision.delivery_time.is_some() {
      self.delivery_time = revision.delivery_time;
    }
    self.counter_price_cents = None;
    self.counter_note = None;
    self.revision += 1;
    Ok(())
  }

  /// System rejection of a live sibling once another quote on the same RFQ
  /// has been accepted. Returns whether the quote changed.
  pub fn withdraw_for_sibling(&mut self, now: DateTime<Utc>) -> LifecycleResult<bool> {
    if !self.is_live() {
      return Ok(false);
    }
    self.reject(SIBLING_ACCEPTED_REASON, now)?;
    Ok(true)
  }
}
