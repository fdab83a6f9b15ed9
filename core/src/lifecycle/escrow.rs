// tradeflow/src/lifecycle/escrow.rs

//! Escrow release and disputes.
//!
//! Funds held in escrow are released either when the buyer confirms receipt
//! or once the release deadline (delivery + `EscrowPolicy::release_after`)
//! has passed. An open dispute blocks both.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::machine::Lifecycle;
use crate::lifecycle::order::{DisputeStatus, Order, OrderStatus};
use crate::lifecycle::payment::PaymentStatus;

pub const DEFAULT_RELEASE_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowPolicy {
  pub release_after: Duration,
}

impl Default for EscrowPolicy {
  fn default() -> Self {
    Self::from_days(DEFAULT_RELEASE_DAYS)
  }
}

impl EscrowPolicy {
  pub fn from_days(days: i64) -> Self {
    Self {
      release_after: Duration::days(days),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseTrigger {
  BuyerConfirmed,
  DeadlineElapsed,
}

impl Order {
  /// Sets the release deadline for a delivered escrow order. Returns whether
  /// a deadline was armed; an existing deadline is kept.
  pub fn arm_escrow_deadline(&mut self, policy: &EscrowPolicy) -> bool {
    if self.status != OrderStatus::Delivered
      || self.payment_status != PaymentStatus::EscrowHold
      || self.escrow_release_deadline.is_some()
    {
      return false;
    }
    match self.delivered_at {
      Some(delivered_at) => {
        self.escrow_release_deadline = Some(delivered_at + policy.release_after);
        true
      }
      None => false,
    }
  }

  fn ensure_releasable(&self) -> LifecycleResult<()> {
    if self.payment_status != PaymentStatus::EscrowHold {
      return Err(LifecycleError::EscrowNotReleasable(format!(
        "payment status is '{}'",
        self.payment_status
      )));
    }
    if self.status != OrderStatus::Delivered {
      return Err(LifecycleError::EscrowNotReleasable(format!(
        "order status is '{}', not delivered",
        self.status
      )));
    }
    if self.dispute_status == DisputeStatus::Open {
      return Err(LifecycleError::EscrowNotReleasable("a dispute is open".to_string()));
    }
    Ok(())
  }

  /// `true` when the deadline sweep would release this order at `now`.
  pub fn is_release_due(&self, now: DateTime<Utc>) -> bool {
    self.ensure_releasable().is_ok() && self.escrow_release_deadline.map(|d| d <= now).unwrap_or(false)
  }

  pub fn release_escrow(&mut self, trigger: ReleaseTrigger, now: DateTime<Utc>) -> LifecycleResult<()> {
    self.ensure_releasable()?;
    if trigger == ReleaseTrigger::DeadlineElapsed {
      match self.escrow_release_deadline {
        Some(deadline) if deadline <= now => {}
        Some(deadline) => {
          return Err(LifecycleError::EscrowNotReleasable(format!(
            "release deadline {deadline} has not passed"
          )))
        }
        None => {
          return Err(LifecycleError::EscrowNotReleasable(
            "no release deadline is armed".to_string(),
          ))
        }
      }
    }
    self.payment_status = self.payment_status.transition(PaymentStatus::Released)?;
    self.escrow_released_at = Some(now);
    self.updated_at = now;
    Ok(())
  }

  /// Buyer dispute while funds are held.
  pub fn open_dispute(&mut self, now: DateTime<Utc>) -> LifecycleResult<()> {
    if self.payment_status != PaymentStatus::EscrowHold {
      return Err(LifecycleError::Validation(
        "disputes can only be opened while funds are held in escrow".to_string(),
      ));
    }
    if self.dispute_status == DisputeStatus::Open {
      return Err(LifecycleError::Validation("a dispute is already open".to_string()));
    }
    if matches!(self.status, OrderStatus::Cancelled) {
      return Err(LifecycleError::Closed {
        entity: OrderStatus::ENTITY,
        id: self.id,
        status: self.status.as_str(),
      });
    }
    self.dispute_status = DisputeStatus::Open;
    self.updated_at = now;
    Ok(())
  }

  pub fn resolve_dispute(&mut self, now: DateTime<Utc>) -> LifecycleResult<()> {
    if self.dispute_status != DisputeStatus::Open {
      return Err(LifecycleError::Validation("no open dispute to resolve".to_string()));
    }
    self.dispute_status = DisputeStatus::Resolved;
    self.updated_at = now;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lifecycle::payment::{PaymentEvent, PaymentPlan};
  use chrono::TimeZone;
  use uuid::Uuid;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 15, 0, 0).unwrap()
  }

  fn delivered_escrow_order() -> Order {
    let mut order = Order::new(Uuid::new_v4(), 8_000, PaymentPlan::Escrow, now());
    order
      .apply_payment(
        &PaymentEvent::EscrowFunded {
          transaction_id: "tx_e".into(),
          amount_cents: 8_000,
          method: None,
        },
        now(),
      )
      .unwrap();
    for next in [
      OrderStatus::Confirmed,
      OrderStatus::Processing,
      OrderStatus::Shipped,
      OrderStatus::Delivered,
    ] {
      order.transition(next, now()).unwrap();
    }
    order
  }

  #[test]
  fn deadline_is_armed_once_from_delivery() {
    let mut order = delivered_escrow_order();
    assert!(order.arm_escrow_deadline(&EscrowPolicy::default()));
    assert_eq!(order.escrow_release_deadline, Some(now() + Duration::days(3)));
    assert!(!order.arm_escrow_deadline(&EscrowPolicy::from_days(10)));
    assert_eq!(order.escrow_release_deadline, Some(now() + Duration::days(3)));
  }

  #[test]
  fn sweep_waits_for_the_deadline() {
    let mut order = delivered_escrow_order();
    order.arm_escrow_deadline(&EscrowPolicy::default());

    assert!(!order.is_release_due(now() + Duration::days(2)));
    assert!(order
      .release_escrow(ReleaseTrigger::DeadlineElapsed, now() + Duration::days(2))
      .is_err());

    let due = now() + Duration::days(3);
    assert!(order.is_release_due(due));
    order.release_escrow(ReleaseTrigger::DeadlineElapsed, due).unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Released);
    assert_eq!(order.escrow_released_at, Some(due));
  }

  #[test]
  fn buyer_can_release_early_unless_disputed() {
    let mut order = delivered_escrow_order();
    order.arm_escrow_deadline(&EscrowPolicy::default());
    order.open_dispute(now()).unwrap();
    assert!(order.release_escrow(ReleaseTrigger::BuyerConfirmed, now()).is_err());
    assert!(!order.is_release_due(now() + Duration::days(30)));

    order.resolve_dispute(now()).unwrap();
    order.release_escrow(ReleaseTrigger::BuyerConfirmed, now()).unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Released);
    assert!(order.release_escrow(ReleaseTrigger::BuyerConfirmed, now()).is_err());
  }

  #[test]
  fn release_requires_delivery() {
    let mut order = Order::new(Uuid::new_v4(), 100, PaymentPlan::Escrow, now());
    order.payment_status = PaymentStatus::EscrowHold;
    order.status = OrderStatus::Shipped;
    assert!(matches!(
      order.release_escrow(ReleaseTrigger::BuyerConfirmed, now()),
      Err(LifecycleError::EscrowNotReleasable(_))
    ));
  }
}
