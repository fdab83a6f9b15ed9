// tradeflow/src/lifecycle/order.rs

//! Order fulfilment status and the order entity itself. Payment and escrow
//! behaviour of `Order` lives in `payment.rs` and `escrow.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::machine::{wire_names, Lifecycle};
use crate::lifecycle::money::line_total;
use crate::lifecycle::payment::{PaymentPlan, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Placed,
  Confirmed,
  Processing,
  Shipped,
  OutForDelivery,
  Delivered,
  Cancelled,
  Returned,
}

wire_names!(OrderStatus, "order", {
  Pending => "pending",
  Placed => "placed",
  Confirmed => "confirmed",
  Processing => "processing",
  Shipped => "shipped",
  OutForDelivery => "out_for_delivery",
  Delivered => "delivered",
  Cancelled => "cancelled",
  Returned => "returned",
});

impl Lifecycle for OrderStatus {
  const ENTITY: &'static str = "order";
  const ALL: &'static [Self] = Self::VARIANTS;

  fn allowed_next(self) -> &'static [Self] {
    use OrderStatus::*;
    match self {
      Pending => &[Placed, Cancelled],
      Placed => &[Confirmed, Cancelled],
      Confirmed => &[Processing, Cancelled],
      Processing => &[Shipped],
      Shipped => &[OutForDelivery, Delivered, Returned],
      OutForDelivery => &[Delivered, Returned],
      Delivered => &[Returned],
      Cancelled | Returned => &[],
    }
  }

  fn name(self) -> &'static str {
    self.as_str()
  }
}

impl OrderStatus {
  pub const CANCELLABLE: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Placed, OrderStatus::Confirmed];

  /// Statuses an order with nothing paid may hold.
  pub const UNPAID_REACHABLE: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Placed, OrderStatus::Confirmed];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
  #[default]
  None,
  Open,
  Resolved,
}

wire_names!(DisputeStatus, "dispute", {
  None => "none",
  Open => "open",
  Resolved => "resolved",
});

/// One order line. Price is a snapshot taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub supplier_id: Option<Uuid>,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

impl OrderItem {
  pub fn line_total_cents(&self) -> LifecycleResult<i64> {
    line_total(self.unit_price_cents, self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub rfq_id: Option<Uuid>,
  pub quote_id: Option<Uuid>,
  pub total_amount_cents: i64,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub status: OrderStatus,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub payment_status: PaymentStatus,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub payment_plan: PaymentPlan,
  pub payment_method: Option<String>,
  pub transaction_id: Option<String>,
  pub deposit_amount_cents: Option<i64>,
  pub balance_due_cents: Option<i64>,
  pub deposit_paid_at: Option<DateTime<Utc>>,
  pub full_payment_paid_at: Option<DateTime<Utc>>,
  pub escrow_released_at: Option<DateTime<Utc>>,
  pub escrow_release_deadline: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub dispute_status: DisputeStatus,
  pub cancellation_reason: Option<String>,
  pub cancelled_at: Option<DateTime<Utc>>,
  pub invoice_url: Option<String>,
  pub invoice_generated_at: Option<DateTime<Utc>>,
  pub idempotency_key: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub version: i32,
}

impl Order {
  /// A fresh `pending` order with nothing paid.
  pub fn new(user_id: Uuid, total_amount_cents: i64, payment_plan: PaymentPlan, now: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id,
      rfq_id: None,
      quote_id: None,
      total_amount_cents,
      status: OrderStatus::Pending,
      payment_status: PaymentStatus::Pending,
      payment_plan,
      payment_method: None,
      transaction_id: None,
      deposit_amount_cents: None,
      balance_due_cents: None,
      deposit_paid_at: None,
      full_payment_paid_at: None,
      escrow_released_at: None,
      escrow_release_deadline: None,
      delivered_at: None,
      dispute_status: DisputeStatus::None,
      cancellation_reason: None,
      cancelled_at: None,
      invoice_url: None,
      invoice_generated_at: None,
      idempotency_key: None,
      created_at: now,
      updated_at: now,
      version: 1,
    }
  }

  /// The single validating entry point for fulfilment changes. Cancellation
  /// goes through [`Order::cancel`] since it needs a reason.
  ///
  /// Until something is paid the order cannot leave `pending` (the first
  /// payment places it) nor move past `confirmed`.
  pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> LifecycleResult<()> {
    if next == OrderStatus::Cancelled {
      return Err(LifecycleError::Validation(
        "orders are cancelled through the cancel operation".to_string(),
      ));
    }
    if self.payment_status == PaymentStatus::Pending
      && (self.status == OrderStatus::Pending || !OrderStatus::UNPAID_REACHABLE.contains(&next))
    {
      return Err(LifecycleError::AwaitingPayment {
        id: self.id,
        to: next.as_str(),
      });
    }
    self.status = self.status.transition(next)?;
    if next == OrderStatus::Delivered {
      self.delivered_at = Some(now);
    }
    self.updated_at = now;
    Ok(())
  }

  pub fn is_cancellable(&self) -> bool {
    OrderStatus::CANCELLABLE.contains(&self.status)
  }

  /// Cancels the order. No refund is triggered here.
  pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> LifecycleResult<()> {
    if !self.is_cancellable() {
      return Err(LifecycleError::NotCancellable {
        status: self.status.as_str(),
      });
    }
    let reason = reason.trim();
    if reason.is_empty() {
      return Err(LifecycleError::Validation("a cancellation reason is required".to_string()));
    }
    self.status = self.status.transition(OrderStatus::Cancelled)?;
    self.cancellation_reason = Some(reason.to_string());
    self.cancelled_at = Some(now);
    self.updated_at = now;
    Ok(())
  }

  /// Issues the invoice once something has been paid. Returns `false` when an
  /// invoice already exists.
  pub fn issue_invoice(&mut self, base_url: &str, now: DateTime<Utc>) -> LifecycleResult<bool> {
    if self.invoice_url.is_some() {
      return Ok(false);
    }
    if self.payment_status == PaymentStatus::Pending {
      return Err(LifecycleError::Validation(format!(
        "order {} has no payment to invoice",
        self.id
      )));
    }
    self.invoice_url = Some(format!(
      "{}/invoices/{}.pdf",
      base_url.trim_end_matches('/'),
      self.id
    ));
    self.invoice_generated_at = Some(now);
    self.updated_at = now;
    Ok(true)
  }

  /// Distinct suppliers across `items`, in first-seen order.
  pub fn suppliers_of(items: &[OrderItem]) -> Vec<Uuid> {
    let mut suppliers = Vec::new();
    for supplier in items.iter().filter_map(|i| i.supplier_id) {
      if !suppliers.contains(&supplier) {
        suppliers.push(supplier);
      }
    }
    suppliers
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap()
  }

  fn order_in(status: OrderStatus) -> Order {
    let mut order = Order::new(Uuid::new_v4(), 10_000, PaymentPlan::Full, now());
    order.status = status;
    order
  }

  #[test]
  fn cancel_only_in_early_statuses() {
    for status in OrderStatus::ALL {
      let mut order = order_in(*status);
      let result = order.cancel("changed my mind", now());
      if OrderStatus::CANCELLABLE.contains(status) {
        assert!(result.is_ok(), "{status} should be cancellable");
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancelled_at, Some(now()));
      } else {
        assert_eq!(
          result,
          Err(LifecycleError::NotCancellable { status: status.as_str() })
        );
      }
    }
  }

  #[test]
  fn shipped_order_rejects_cancel() {
    let mut order = order_in(OrderStatus::Shipped);
    assert!(!order.is_cancellable());
    assert!(order.cancel("late", now()).is_err());
    assert_eq!(order.status, OrderStatus::Shipped);
  }

  #[test]
  fn transition_stamps_delivery() {
    let mut order = order_in(OrderStatus::Shipped);
    order.payment_status = PaymentStatus::FullPaid;
    order.transition(OrderStatus::OutForDelivery, now()).unwrap();
    order.transition(OrderStatus::Delivered, now()).unwrap();
    assert_eq!(order.delivered_at, Some(now()));
    order.transition(OrderStatus::Returned, now()).unwrap();
    assert!(order.transition(OrderStatus::Delivered, now()).is_err());
  }

  #[test]
  fn transition_never_skips_ahead() {
    let mut order = order_in(OrderStatus::Placed);
    assert!(order.transition(OrderStatus::Shipped, now()).is_err());
    assert!(order.transition(OrderStatus::Cancelled, now()).is_err());
    assert_eq!(order.status, OrderStatus::Placed);
  }

  #[test]
  fn invoice_needs_a_payment_and_is_issued_once() {
    let mut order = order_in(OrderStatus::Placed);
    assert!(order.issue_invoice("https://shop.example/", now()).is_err());

    order.payment_status = PaymentStatus::FullPaid;
    assert!(order.issue_invoice("https://shop.example/", now()).unwrap());
    let url = order.invoice_url.clone().unwrap();
    assert_eq!(url, format!("https://shop.example/invoices/{}.pdf", order.id));
    assert!(!order.issue_invoice("https://other.example", now()).unwrap());
    assert_eq!(order.invoice_url, Some(url));
  }
}
