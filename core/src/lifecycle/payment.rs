// tradeflow/src/lifecycle/payment.rs

//! Payment sub-state of an order and the events that drive it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::machine::{wire_names, Lifecycle};
use crate::lifecycle::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  DepositPaid,
  FullPaid,
  EscrowHold,
  Released,
}

wire_names!(PaymentStatus, "payment", {
  Pending => "pending",
  DepositPaid => "deposit_paid",
  FullPaid => "full_paid",
  EscrowHold => "escrow_hold",
  Released => "released",
});

impl Lifecycle for PaymentStatus {
  const ENTITY: &'static str = "payment";
  const ALL: &'static [Self] = Self::VARIANTS;

  fn allowed_next(self) -> &'static [Self] {
    use PaymentStatus::*;
    match self {
      Pending => &[DepositPaid, FullPaid, EscrowHold],
      DepositPaid => &[FullPaid],
      EscrowHold => &[Released],
      FullPaid | Released => &[],
    }
  }

  fn name(self) -> &'static str {
    self.as_str()
  }
}

/// How the buyer pays. Each plan walks its own path through the payment
/// table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlan {
  #[default]
  Full,
  Deposit,
  Escrow,
}

wire_names!(PaymentPlan, "payment_plan", {
  Full => "full",
  Deposit => "deposit",
  Escrow => "escrow",
});

impl PaymentPlan {
  /// Payment statuses reachable under this plan.
  pub fn path(self) -> &'static [PaymentStatus] {
    use PaymentStatus::*;
    match self {
      PaymentPlan::Full => &[Pending, FullPaid],
      PaymentPlan::Deposit => &[Pending, DepositPaid, FullPaid],
      PaymentPlan::Escrow => &[Pending, EscrowHold, Released],
    }
  }

  pub fn permits(self, status: PaymentStatus) -> bool {
    self.path().contains(&status)
  }
}

/// A confirmed payment reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
  DepositPaid {
    transaction_id: String,
    amount_cents: i64,
    method: Option<String>,
  },
  FullPaid {
    transaction_id: String,
    amount_cents: i64,
    method: Option<String>,
  },
  EscrowFunded {
    transaction_id: String,
    amount_cents: i64,
    method: Option<String>,
  },
}

impl PaymentEvent {
  pub fn target_status(&self) -> PaymentStatus {
    match self {
      PaymentEvent::DepositPaid { .. } => PaymentStatus::DepositPaid,
      PaymentEvent::FullPaid { .. } => PaymentStatus::FullPaid,
      PaymentEvent::EscrowFunded { .. } => PaymentStatus::EscrowHold,
    }
  }

  pub fn transaction_id(&self) -> &str {
    match self {
      PaymentEvent::DepositPaid { transaction_id, .. }
      | PaymentEvent::FullPaid { transaction_id, .. }
      | PaymentEvent::EscrowFunded { transaction_id, .. } => transaction_id,
    }
  }

  pub fn amount_cents(&self) -> i64 {
    match self {
      PaymentEvent::DepositPaid { amount_cents, .. }
      | PaymentEvent::FullPaid { amount_cents, .. }
      | PaymentEvent::EscrowFunded { amount_cents, .. } => *amount_cents,
    }
  }

  pub fn method(&self) -> Option<&str> {
    match self {
      PaymentEvent::DepositPaid { method, .. }
      | PaymentEvent::FullPaid { method, .. }
      | PaymentEvent::EscrowFunded { method, .. } => method.as_deref(),
    }
  }
}

impl Order {
  /// What the next payment must amount to: the deposit or the total while
  /// nothing is paid, the balance after a deposit, zero afterwards.
  pub fn amount_outstanding(&self) -> i64 {
    match (self.payment_status, self.payment_plan) {
      (PaymentStatus::Pending, PaymentPlan::Deposit) => self.deposit_amount_cents.unwrap_or(self.total_amount_cents),
      (PaymentStatus::Pending, _) => self.total_amount_cents,
      (PaymentStatus::DepositPaid, _) => self
        .balance_due_cents
        .unwrap_or(self.total_amount_cents - self.deposit_amount_cents.unwrap_or(0)),
      _ => 0,
    }
  }

  /// `true` when `event` already produced the current payment state.
  pub fn is_payment_replay(&self, event: &PaymentEvent) -> bool {
    self.payment_status == event.target_status() && self.transaction_id.as_deref() == Some(event.transaction_id())
  }

  /// Applies a gateway payment event. Returns `false` for a replay of the
  /// event that produced the current state.
  ///
  /// The first successful payment moves a `pending` order to `placed`.
  pub fn apply_payment(&mut self, event: &PaymentEvent, now: DateTime<Utc>) -> LifecycleResult<bool> {
    if self.is_payment_replay(event) {
      return Ok(false);
    }
    if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Returned) {
      return Err(LifecycleError::Closed {
        entity: OrderStatus::ENTITY,
        id: self.id,
        status: self.status.as_str(),
      });
    }

    let target = event.target_status();
    if !self.payment_plan.permits(target) {
      return Err(LifecycleError::PlanMismatch {
        plan: self.payment_plan.as_str(),
        status: target.as_str(),
      });
    }
    // a deposit plan settles its balance with a full payment, but only
    // after the deposit itself
    if self.payment_plan == PaymentPlan::Deposit
      && target == PaymentStatus::FullPaid
      && self.payment_status == PaymentStatus::Pending
    {
      return Err(LifecycleError::InvalidTransition {
        entity: PaymentStatus::ENTITY,
        from: self.payment_status.as_str(),
        to: target.as_str(),
      });
    }
    let next = self.payment_status.transition(target)?;

    let expected = self.amount_outstanding();
    if event.amount_cents() != expected {
      return Err(LifecycleError::AmountMismatch {
        expected,
        actual: event.amount_cents(),
      });
    }

    if self.status == OrderStatus::Pending {
      self.status = self.status.transition(OrderStatus::Placed)?;
    }
    self.payment_status = next;
    match next {
      PaymentStatus::DepositPaid => self.deposit_paid_at = Some(now),
      PaymentStatus::FullPaid | PaymentStatus::EscrowHold => self.full_payment_paid_at = Some(now),
      _ => {}
    }
    self.transaction_id = Some(event.transaction_id().to_string());
    if let Some(method) = event.method() {
      self.payment_method = Some(method.to_string());
    }
    self.updated_at = now;
    Ok(true)
  }
}
