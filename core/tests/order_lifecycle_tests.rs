// tests/order_lifecycle_tests.rs
mod common;

use chrono::Duration;
use common::*;
use tradeflow::{
  DirectLine, EscrowPolicy, Lifecycle, LifecycleError, OrderDraft, OrderStatus, PaymentEvent, PaymentPlan,
  PaymentStatus, ReleaseTrigger,
};
use uuid::Uuid;

fn line(stock: i32, moq: i32, quantity: i32, unit_price_cents: i64) -> DirectLine {
  DirectLine {
    product_id: Uuid::new_v4(),
    supplier_id: Some(Uuid::new_v4()),
    quantity,
    unit_price_cents,
    min_order_quantity: moq,
    stock_quantity: stock,
  }
}

#[test]
fn test_deposit_order_balance_is_total_minus_deposit() {
  setup_tracing();
  let parties = Parties::new();
  let draft = quoted_order(&parties, PaymentPlan::Deposit);
  let order = &draft.order;

  assert_eq!(order.total_amount_cents, 10_000);
  assert_eq!(order.deposit_amount_cents, Some(3_000));
  assert_eq!(order.balance_due_cents, Some(7_000));
  assert_eq!(order.status, OrderStatus::Pending);
  assert_eq!(order.payment_status, PaymentStatus::Pending);

  let item = &draft.items[0];
  assert_eq!(item.order_id, order.id);
  assert_eq!(item.product_id, parties.product);
  assert_eq!(item.supplier_id, Some(parties.supplier));
  assert_eq!(item.quantity, 100);
  assert_eq!(item.line_total_cents().unwrap(), 10_000);
}

#[test]
fn test_deposit_plan_requires_a_deposit_offer() {
  let parties = Parties::new();
  let (mut rfq, quote) = accepted_pair(&parties, 10, 100, 0);
  let err = OrderDraft::from_quote(&mut rfq, &quote, parties.buyer, PaymentPlan::Deposit, t0()).unwrap_err();
  assert!(matches!(err, LifecycleError::Validation(_)));
}

#[test]
fn test_cancel_eligibility_by_status() {
  let parties = Parties::new();
  for status in OrderStatus::ALL {
    let mut order = quoted_order(&parties, PaymentPlan::Full).order;
    order.status = *status;
    let expected = matches!(status, OrderStatus::Pending | OrderStatus::Placed | OrderStatus::Confirmed);
    assert_eq!(order.is_cancellable(), expected, "{status}");
    assert_eq!(order.cancel("no longer needed", t0()).is_ok(), expected, "{status}");
  }
}

#[test]
fn test_shipped_order_cannot_be_cancelled() {
  let parties = Parties::new();
  let mut order = quoted_order(&parties, PaymentPlan::Full).order;
  order.status = OrderStatus::Shipped;
  assert_eq!(
    order.cancel("too slow", t0()),
    Err(LifecycleError::NotCancellable { status: "shipped" })
  );
  assert_eq!(order.cancelled_at, None);
}

#[test]
fn test_unpaid_order_is_held_before_processing() {
  let parties = Parties::new();
  let mut order = quoted_order(&parties, PaymentPlan::Escrow).order;

  // only the first payment places an order
  assert!(matches!(
    order.transition(OrderStatus::Placed, t0()),
    Err(LifecycleError::AwaitingPayment { to: "placed", .. })
  ));
  assert_eq!(order.status, OrderStatus::Pending);

  order.status = OrderStatus::Placed;
  order.transition(OrderStatus::Confirmed, t0()).unwrap();
  assert!(matches!(
    order.transition(OrderStatus::Processing, t0()),
    Err(LifecycleError::AwaitingPayment { to: "processing", .. })
  ));
  assert_eq!(order.status, OrderStatus::Confirmed);

  order
    .apply_payment(
      &PaymentEvent::EscrowFunded {
        transaction_id: "esc_late".into(),
        amount_cents: 10_000,
        method: None,
      },
      t0(),
    )
    .unwrap();
  order.transition(OrderStatus::Processing, t0()).unwrap();
}

#[test]
fn test_full_payment_path_through_delivery() {
  setup_tracing();
  let parties = Parties::new();
  let mut order = quoted_order(&parties, PaymentPlan::Full).order;

  order
    .apply_payment(
      &PaymentEvent::FullPaid {
        transaction_id: "pi_123".into(),
        amount_cents: 10_000,
        method: Some("card".into()),
      },
      t0(),
    )
    .unwrap();
  assert_eq!(order.status, OrderStatus::Placed);
  assert_eq!(order.full_payment_paid_at, Some(t0()));

  let path = [
    OrderStatus::Confirmed,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::OutForDelivery,
    OrderStatus::Delivered,
  ];
  for (idx, next) in path.into_iter().enumerate() {
    order.transition(next, t0() + Duration::hours(idx as i64)).unwrap();
  }
  assert_eq!(order.delivered_at, Some(t0() + Duration::hours(4)));
  // escrow is not involved with a full payment
  assert!(!order.arm_escrow_deadline(&EscrowPolicy::default()));
}

#[test]
fn test_escrow_order_released_after_deadline() {
  setup_tracing();
  let parties = Parties::new();
  let mut order = quoted_order(&parties, PaymentPlan::Escrow).order;
  order
    .apply_payment(
      &PaymentEvent::EscrowFunded {
        transaction_id: "esc_1".into(),
        amount_cents: 10_000,
        method: None,
      },
      t0(),
    )
    .unwrap();
  assert_eq!(order.payment_status, PaymentStatus::EscrowHold);

  for next in [
    OrderStatus::Confirmed,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
  ] {
    order.transition(next, t0()).unwrap();
  }
  assert!(order.arm_escrow_deadline(&EscrowPolicy::from_days(3)));

  let early = t0() + Duration::days(1);
  assert!(!order.is_release_due(early));
  let due = t0() + Duration::days(3);
  assert!(order.is_release_due(due));
  order.release_escrow(ReleaseTrigger::DeadlineElapsed, due).unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Released);
}

#[test]
fn test_direct_checkout_snapshots_prices() {
  let buyer = Uuid::new_v4();
  let lines = vec![line(100, 10, 20, 250), line(5, 1, 5, 1_000)];
  let draft = OrderDraft::direct(buyer, &lines, PaymentPlan::Full, t0())
    .unwrap()
    .with_idempotency_key(Some("chk-42".into()));

  assert_eq!(draft.order.total_amount_cents, 20 * 250 + 5 * 1_000);
  assert_eq!(draft.order.idempotency_key.as_deref(), Some("chk-42"));
  assert_eq!(draft.order.rfq_id, None);
  assert_eq!(draft.items.len(), 2);
  assert_eq!(draft.items[1].unit_price_cents, 1_000);
}

#[test]
fn test_direct_checkout_validates_lines() {
  let buyer = Uuid::new_v4();

  let below_moq = [line(100, 10, 9, 100)];
  assert!(OrderDraft::direct(buyer, &below_moq, PaymentPlan::Full, t0()).is_err());

  let over_stock = [line(3, 1, 4, 100)];
  assert!(OrderDraft::direct(buyer, &over_stock, PaymentPlan::Full, t0()).is_err());

  let ok = [line(10, 1, 2, 100)];
  assert!(OrderDraft::direct(buyer, &ok, PaymentPlan::Deposit, t0()).is_err());
  assert!(OrderDraft::direct(buyer, &[], PaymentPlan::Full, t0()).is_err());

  let twice = [ok[0].clone(), ok[0].clone()];
  assert!(OrderDraft::direct(buyer, &twice, PaymentPlan::Escrow, t0()).is_err());
}
