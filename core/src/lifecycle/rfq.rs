// tradeflow/src/lifecycle/rfq.rs

//! Request for quotation: a buyer asking one supplier to price a product and
//! quantity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::expiry::{is_expired, Expiring};
use crate::lifecycle::machine::{wire_names, Lifecycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfqStatus {
  Pending,
  Quoted,
  Accepted,
  Rejected,
  Expired,
  Converted,
}

wire_names!(RfqStatus, "rfq", {
  Pending => "pending",
  Quoted => "quoted",
  Accepted => "accepted",
  Rejected => "rejected",
  Expired => "expired",
  Converted => "converted",
});

impl Lifecycle for RfqStatus {
  const ENTITY: &'static str = "rfq";
  const ALL: &'static [Self] = Self::VARIANTS;

  fn allowed_next(self) -> &'static [Self] {
    use RfqStatus::*;
    match self {
      Pending => &[Quoted, Expired],
      Quoted => &[Accepted, Rejected, Expired],
      Accepted => &[Converted],
      Rejected | Expired | Converted => &[],
    }
  }

  fn name(self) -> &'static str {
    self.as_str()
  }
}

impl RfqStatus {
  /// Statuses that still run a clock.
  pub fn can_expire(self) -> bool {
    matches!(self, RfqStatus::Pending | RfqStatus::Quoted)
  }
}

/// Buyer input for a new RFQ.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRfq {
  pub buyer_id: Uuid,
  pub supplier_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub target_price_cents: Option<i64>,
  pub delivery_location: String,
  pub notes: Option<String>,
  #[serde(default)]
  pub attachments: Vec<String>,
  pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Rfq {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub supplier_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub target_price_cents: Option<i64>,
  pub delivery_location: String,
  pub notes: Option<String>,
  pub attachments: Vec<String>,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub status: RfqStatus,
  pub expires_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub version: i32,
}

impl Expiring for Rfq {
  fn expires_at(&self) -> DateTime<Utc> {
    self.expires_at
  }
}

impl Rfq {
  pub fn new(input: NewRfq, now: DateTime<Utc>, default_ttl: Duration) -> LifecycleResult<Self> {
    if input.quantity < 1 {
      return Err(LifecycleError::Validation(format!(
        "RFQ quantity must be at least 1 (got {})",
        input.quantity
      )));
    }
    let delivery_location = input.delivery_location.trim().to_string();
    if delivery_location.is_empty() {
      return Err(LifecycleError::Validation("delivery location is required".to_string()));
    }
    if let Some(target) = input.target_price_cents {
      if target <= 0 {
        return Err(LifecycleError::Validation(format!(
          "target price must be positive (got {target})"
        )));
      }
    }
    if input.buyer_id == input.supplier_id {
      return Err(LifecycleError::Validation("buyer and supplier must differ".to_string()));
    }

    let expires_at = input.expires_at.unwrap_or(now + default_ttl);
    if expires_at <= now {
      return Err(LifecycleError::Validation("RFQ expiry must lie in the future".to_string()));
    }

    Ok(Self {
      id: Uuid::new_v4(),
      buyer_id: input.buyer_id,
      supplier_id: input.supplier_id,
      product_id: input.product_id,
      quantity: input.quantity,
      target_price_cents: input.target_price_cents,
      delivery_location,
      notes: input.notes.filter(|n| !n.trim().is_empty()),
      attachments: input.attachments,
      status: RfqStatus::Pending,
      expires_at,
      created_at: now,
      updated_at: now,
      version: 1,
    })
  }

  /// Status as every reader must see it: an overdue pending or quoted RFQ
  /// reads as expired even before that is persisted.
  pub fn effective_status(&self, now: DateTime<Utc>) -> RfqStatus {
    if self.status.can_expire() && is_expired(self, now) {
      RfqStatus::Expired
    } else {
      self.status
    }
  }

  /// `true` when the stored status lags behind the effective one.
  pub fn needs_expiry(&self, now: DateTime<Utc>) -> bool {
    self.effective_status(now) != self.status
  }

  pub fn is_participant(&self, user_id: Uuid) -> bool {
    self.buyer_id == user_id || self.supplier_id == user_id
  }

  /// The single validating entry point for RFQ status changes.
  ///
  /// An RFQ that is effectively expired only accepts `expired`; moving to
  /// `expired` requires the deadline to have passed.
  pub fn transition(&mut self, next: RfqStatus, now: DateTime<Utc>) -> LifecycleResult<()> {
    let effective = self.effective_status(now);
    if effective == RfqStatus::Expired && next != RfqStatus::Expired {
      return Err(self.expired_error());
    }
    if next == RfqStatus::Expired && !is_expired(self, now) {
      return Err(LifecycleError::Validation(format!(
        "RFQ {} has not reached its expiry",
        self.id
      )));
    }

    self.status = self.status.transition(next)?;
    self.updated_at = now;
    Ok(())
  }

  /// Persists the expiry of an overdue RFQ. Returns whether anything changed.
  pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
    if self.needs_expiry(now) {
      self.status = RfqStatus::Expired;
      self.updated_at = now;
      true
    } else {
      false
    }
  }

  pub fn ensure_open_for_quotes(&self, now: DateTime<Utc>) -> LifecycleResult<()> {
    match self.effective_status(now) {
      RfqStatus::Pending | RfqStatus::Quoted => Ok(()),
      RfqStatus::Expired => Err(self.expired_error()),
      other => Err(LifecycleError::Closed {
        entity: RfqStatus::ENTITY,
        id: self.id,
        status: other.as_str(),
      }),
    }
  }

  /// Server-side guard for accepting any quote of this RFQ: not expired and
  /// no quote accepted yet.
  pub fn ensure_quote_acceptable(&self, now: DateTime<Utc>) -> LifecycleResult<()> {
    match self.effective_status(now) {
      RfqStatus::Quoted => Ok(()),
      RfqStatus::Expired => Err(self.expired_error()),
      RfqStatus::Accepted | RfqStatus::Converted => Err(LifecycleError::AlreadyAccepted { rfq_id: self.id }),
      other => Err(LifecycleError::InvalidTransition {
        entity: RfqStatus::ENTITY,
        from: other.as_str(),
        to: RfqStatus::Accepted.as_str(),
      }),
    }
  }

  /// Marks the RFQ quoted when a supplier responds. A further quote on an
  /// already quoted RFQ changes nothing.
  pub fn record_quote(&mut self, now: DateTime<Utc>) -> LifecycleResult<()> {
    self.ensure_open_for_quotes(now)?;
    if self.status == RfqStatus::Pending {
      self.transition(RfqStatus::Quoted, now)?;
    }
    Ok(())
  }

  fn expired_error(&self) -> LifecycleError {
    LifecycleError::Expired {
      entity: RfqStatus::ENTITY,
      id: self.id,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
  }

  fn input() -> NewRfq {
    NewRfq {
      buyer_id: Uuid::new_v4(),
      supplier_id: Uuid::new_v4(),
      product_id: Uuid::new_v4(),
      quantity: 500,
      target_price_cents: Some(1_200),
      delivery_location: "  Rotterdam, NL ".to_string(),
      notes: Some("   ".to_string()),
      attachments: vec![],
      expires_at: None,
    }
  }

  #[test]
  fn new_applies_default_ttl_and_trims() {
    let rfq = Rfq::new(input(), now(), Duration::days(14)).unwrap();
    assert_eq!(rfq.status, RfqStatus::Pending);
    assert_eq!(rfq.expires_at, now() + Duration::days(14));
    assert_eq!(rfq.delivery_location, "Rotterdam, NL");
    assert_eq!(rfq.notes, None);
    assert_eq!(rfq.version, 1);
  }

  #[test]
  fn new_rejects_bad_input() {
    let mut zero = input();
    zero.quantity = 0;
    assert!(matches!(
      Rfq::new(zero, now(), Duration::days(1)),
      Err(LifecycleError::Validation(_))
    ));

    let mut past = input();
    past.expires_at = Some(now() - Duration::minutes(1));
    assert!(Rfq::new(past, now(), Duration::days(1)).is_err());

    let mut blank = input();
    blank.delivery_location = " ".to_string();
    assert!(Rfq::new(blank, now(), Duration::days(1)).is_err());
  }

  #[test]
  fn overdue_rfq_reads_as_expired_and_refuses_quotes() {
    let mut rfq = Rfq::new(input(), now(), Duration::days(1)).unwrap();
    let later = now() + Duration::days(2);

    assert_eq!(rfq.effective_status(later), RfqStatus::Expired);
    assert!(matches!(rfq.record_quote(later), Err(LifecycleError::Expired { .. })));
    assert!(matches!(
      rfq.transition(RfqStatus::Quoted, later),
      Err(LifecycleError::Expired { .. })
    ));

    assert!(rfq.expire_if_due(later));
    assert_eq!(rfq.status, RfqStatus::Expired);
    assert!(rfq.expires_at < later);
    assert!(!rfq.expire_if_due(later));
  }

  #[test]
  fn expiry_cannot_be_forced_early() {
    let mut rfq = Rfq::new(input(), now(), Duration::days(1)).unwrap();
    assert!(rfq.transition(RfqStatus::Expired, now()).is_err());
    assert_eq!(rfq.status, RfqStatus::Pending);
  }

  #[test]
  fn second_quote_keeps_rfq_quoted() {
    let mut rfq = Rfq::new(input(), now(), Duration::days(3)).unwrap();
    rfq.record_quote(now()).unwrap();
    rfq.record_quote(now()).unwrap();
    assert_eq!(rfq.status, RfqStatus::Quoted);
  }

  #[test]
  fn acceptance_guard() {
    let mut rfq = Rfq::new(input(), now(), Duration::days(3)).unwrap();
    assert!(rfq.ensure_quote_acceptable(now()).is_err());
    rfq.record_quote(now()).unwrap();
    rfq.ensure_quote_acceptable(now()).unwrap();
    rfq.transition(RfqStatus::Accepted, now()).unwrap();
    assert_eq!(
      rfq.ensure_quote_acceptable(now()),
      Err(LifecycleError::AlreadyAccepted { rfq_id: rfq.id })
    );
  }
}
