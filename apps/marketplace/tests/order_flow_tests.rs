// apps/marketplace/tests/order_flow_tests.rs
mod common;

use chrono::Duration;
use common::*;
use marketplace_app::db::{ChangeSet, MarketplaceStore};
use marketplace_app::errors::AppError;
use marketplace_app::models::{Actor, Role};
use marketplace_app::pipelines::contexts::{
  AdvanceStatus, CancelOrder, CheckoutRequest, ConfirmReceipt, DisputeAction, ExpireRfqsCtxData, IssueInvoice,
  ReleaseEscrowCtxData,
};
use tradeflow::{
  ContextData, DisputeStatus, LifecycleError, OrderStatus, PaymentPlan, PaymentStatus, PipelineResult, RfqStatus,
};
use uuid::Uuid;

fn advance(status: OrderStatus) -> AdvanceStatus {
  AdvanceStatus { status }
}

fn cancel(reason: &str) -> CancelOrder {
  CancelOrder {
    reason: reason.to_string(),
  }
}

/// Walks a paid order from placed to delivered as its supplier.
async fn deliver(app: &TestApp, order_id: Uuid) {
  for status in [
    OrderStatus::Confirmed,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
  ] {
    app.order_action(app.supplier, order_id, advance(status)).await.unwrap();
  }
}

#[tokio::test]
async fn quote_checkout_converts_the_rfq_and_splits_the_deposit() {
  let app = spawn_app().await;
  let quote = app.accepted_quote().await;

  let order = app.checkout_quote(quote.id, PaymentPlan::Deposit).await.unwrap();
  assert_eq!(order.status, OrderStatus::Pending);
  assert_eq!(order.total_amount_cents, 10000);
  assert_eq!(order.deposit_amount_cents, Some(3000));
  assert_eq!(order.balance_due_cents, Some(7000));
  assert_eq!(order.quote_id, Some(quote.id));

  assert_eq!(app.store.get_rfq(quote.rfq_id).await.unwrap().status, RfqStatus::Converted);
  let items = app.store.list_order_items(order.id).await.unwrap();
  assert_eq!(items.len(), 1);
  assert_eq!(items[0].supplier_id, Some(app.supplier.user_id));

  // the RFQ is spent
  let err = app.checkout_quote(quote.id, PaymentPlan::Full).await.unwrap_err();
  assert_eq!(actix_web::ResponseError::status_code(&err).as_u16(), 409, "{err:?}");
}

#[tokio::test]
async fn checkout_rejects_quote_and_lines_together() {
  let app = spawn_app().await;
  let quote = app.accepted_quote().await;
  let request = CheckoutRequest {
    quote_id: Some(quote.id),
    lines: vec![marketplace_app::pipelines::contexts::CheckoutLine {
      product_id: app.product.id,
      quantity: 10,
    }],
    payment_plan: PaymentPlan::Full,
  };
  let err = app.checkout(request, None).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)), "{err:?}");
}

#[tokio::test]
async fn checkout_replays_the_order_of_a_repeated_idempotency_key() {
  let app = spawn_app().await;
  let request = || CheckoutRequest {
    quote_id: None,
    lines: vec![marketplace_app::pipelines::contexts::CheckoutLine {
      product_id: app.product.id,
      quantity: 20,
    }],
    payment_plan: PaymentPlan::Full,
  };

  let (first, ctx_data) = app.checkout(request(), Some("chk-001")).await.unwrap();
  assert_eq!(first, PipelineResult::Completed);
  let order_id = ctx_data.read().draft.as_ref().map(|d| d.order.id).unwrap();
  assert!(ctx_data.read().payment_intent.is_some());

  let (second, ctx_data) = app.checkout(request(), Some("chk-001")).await.unwrap();
  assert_eq!(second, PipelineResult::Stopped);
  assert_eq!(ctx_data.read().replayed_order.as_ref().map(|o| o.id), Some(order_id));

  // stock was reserved once
  assert_eq!(app.store.get_product(app.product.id).await.unwrap().stock_quantity, 980);
  assert_eq!(app.store.list_orders_for(app.buyer.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn direct_checkout_reserves_stock_and_refuses_deposits() {
  let app = spawn_app().await;

  let order = app.checkout_direct(40, PaymentPlan::Escrow).await.unwrap();
  assert_eq!(order.total_amount_cents, 40 * 2500);
  assert_eq!(app.store.get_product(app.product.id).await.unwrap().stock_quantity, 960);

  let err = app.checkout_direct(40, PaymentPlan::Deposit).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::Validation(_))), "{err:?}");

  // below the minimum order quantity
  let err = app.checkout_direct(5, PaymentPlan::Full).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::Validation(_))), "{err:?}");
}

#[tokio::test]
async fn deposit_then_balance_settles_the_order() {
  let app = spawn_app().await;
  let quote = app.accepted_quote().await;
  let order = app.checkout_quote(quote.id, PaymentPlan::Deposit).await.unwrap();

  // the balance cannot come first
  let err = app.pay(order.id, "full_paid", "tx-0", 7000).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::InvalidTransition { .. })), "{err:?}");

  assert!(app.pay(order.id, "deposit_paid", "tx-1", 3000).await.unwrap());
  let stored = app.store.get_order(order.id).await.unwrap();
  assert_eq!(stored.status, OrderStatus::Placed);
  assert_eq!(stored.payment_status, PaymentStatus::DepositPaid);
  assert_eq!(stored.amount_outstanding(), 7000);

  // provider retry of the same event
  assert!(!app.pay(order.id, "deposit_paid", "tx-1", 3000).await.unwrap());

  let err = app.pay(order.id, "full_paid", "tx-2", 6999).await.unwrap_err();
  assert!(
    matches!(err, AppError::Lifecycle(LifecycleError::AmountMismatch { expected: 7000, actual: 6999 })),
    "{err:?}"
  );
  assert!(app.pay(order.id, "full_paid", "tx-2", 7000).await.unwrap());
  let stored = app.store.get_order(order.id).await.unwrap();
  assert_eq!(stored.payment_status, PaymentStatus::FullPaid);
  assert_eq!(stored.transaction_id.as_deref(), Some("tx-2"));
}

#[tokio::test]
async fn webhook_events_must_match_the_payment_plan() {
  let app = spawn_app().await;
  let order = app.checkout_direct(10, PaymentPlan::Full).await.unwrap();

  let err = app.pay(order.id, "escrow_funded", "tx-1", 25000).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::PlanMismatch { .. })), "{err:?}");

  let err = app.webhook(b"{\"order_id\":\"nope\"}".to_vec(), None).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)), "{err:?}");
}

#[tokio::test]
async fn webhook_secret_is_enforced_when_configured() {
  let app = spawn_app_with(marketplace_app::config::AppConfig {
    webhook_secret: Some("whsec_test".to_string()),
    ..Default::default()
  })
  .await;
  let order = app.checkout_direct(10, PaymentPlan::Full).await.unwrap();
  let body = || payment_body(order.id, "full_paid", "tx-1", 25000);

  let err = app.webhook(body(), None).await.unwrap_err();
  assert!(matches!(err, AppError::Auth(_)), "{err:?}");
  let err = app.webhook(body(), Some("whsec_wrong")).await.unwrap_err();
  assert!(matches!(err, AppError::Auth(_)), "{err:?}");
  assert!(app.webhook(body(), Some("whsec_test")).await.unwrap());
}

#[tokio::test]
async fn escrow_is_released_when_the_buyer_confirms_receipt() {
  let app = spawn_app().await;
  let order = app.checkout_direct(10, PaymentPlan::Escrow).await.unwrap();
  app.pay(order.id, "escrow_funded", "tx-1", 25000).await.unwrap();

  // not before delivery
  let err = app.order_action(app.buyer, order.id, ConfirmReceipt).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::EscrowNotReleasable(_))), "{err:?}");

  deliver(&app, order.id).await;
  let delivered = app.store.get_order(order.id).await.unwrap();
  assert_eq!(delivered.escrow_release_deadline, Some(t0() + Duration::days(3)));

  let released = app.order_action(app.buyer, order.id, ConfirmReceipt).await.unwrap();
  assert_eq!(released.payment_status, PaymentStatus::Released);
  assert_eq!(released.escrow_released_at, Some(t0()));
}

#[tokio::test]
async fn unpaid_orders_are_not_fulfilled_and_late_escrow_still_gets_a_deadline() {
  let app = spawn_app().await;
  let order = app.checkout_direct(10, PaymentPlan::Escrow).await.unwrap();

  let err = app
    .order_action(app.supplier, order.id, advance(OrderStatus::Placed))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::AwaitingPayment { .. })), "{err:?}");
  assert_eq!(actix_web::ResponseError::status_code(&err).as_u16(), 402);
  assert_eq!(app.store.get_order(order.id).await.unwrap().status, OrderStatus::Pending);

  // a row delivered before its escrow was funded
  let mut stale = app.store.get_order(order.id).await.unwrap();
  stale.status = OrderStatus::Delivered;
  stale.delivered_at = Some(t0());
  let mut changes = ChangeSet::new();
  changes.update_order(&mut stale);
  app.store.commit(changes).await.unwrap();

  app.clock.advance(Duration::days(1));
  assert!(app.pay(order.id, "escrow_funded", "tx-late", 25000).await.unwrap());
  let funded = app.store.get_order(order.id).await.unwrap();
  assert_eq!(funded.payment_status, PaymentStatus::EscrowHold);
  assert_eq!(funded.escrow_release_deadline, Some(t0() + Duration::days(3)));

  app.clock.advance(Duration::days(2));
  let ctx_data = ContextData::new(ReleaseEscrowCtxData {
    app_state: app.state.clone(),
    now: app.now(),
    due: Vec::new(),
    released: Vec::new(),
    skipped: Vec::new(),
  });
  app.state.flows.run(ctx_data.clone()).await.unwrap();
  assert_eq!(ctx_data.read().released, vec![order.id]);
  assert_eq!(
    app.store.get_order(order.id).await.unwrap().payment_status,
    PaymentStatus::Released
  );
}

#[tokio::test]
async fn release_sweep_skips_disputed_orders_until_resolved() {
  let app = spawn_app().await;
  let calm = app.checkout_direct(10, PaymentPlan::Escrow).await.unwrap();
  let disputed = app.checkout_direct(12, PaymentPlan::Escrow).await.unwrap();
  app.pay(calm.id, "escrow_funded", "tx-a", 25000).await.unwrap();
  app.pay(disputed.id, "escrow_funded", "tx-b", 30000).await.unwrap();
  deliver(&app, calm.id).await;
  deliver(&app, disputed.id).await;

  let opened = app.order_action(app.buyer, disputed.id, DisputeAction::Open).await.unwrap();
  assert_eq!(opened.dispute_status, DisputeStatus::Open);

  let sweep = |app: &TestApp| {
    ContextData::new(ReleaseEscrowCtxData {
      app_state: app.state.clone(),
      now: app.now(),
      due: Vec::new(),
      released: Vec::new(),
      skipped: Vec::new(),
    })
  };

  // nothing is due before the deadline
  let ctx_data = sweep(&app);
  app.state.flows.run(ctx_data.clone()).await.unwrap();
  assert!(ctx_data.read().released.is_empty());

  app.clock.advance(Duration::days(3));
  let ctx_data = sweep(&app);
  app.state.flows.run(ctx_data.clone()).await.unwrap();
  assert_eq!(ctx_data.read().released, vec![calm.id]);
  assert_eq!(
    app.store.get_order(disputed.id).await.unwrap().payment_status,
    PaymentStatus::EscrowHold
  );

  // only an admin resolves
  let err = app
    .order_action(app.buyer, disputed.id, DisputeAction::Resolve)
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");
  app.order_action(app.admin, disputed.id, DisputeAction::Resolve).await.unwrap();

  let ctx_data = sweep(&app);
  app.state.flows.run(ctx_data.clone()).await.unwrap();
  assert_eq!(ctx_data.read().released, vec![disputed.id]);
}

#[tokio::test]
async fn orders_cancel_only_before_processing() {
  let app = spawn_app().await;
  let early = app.checkout_direct(10, PaymentPlan::Full).await.unwrap();
  let cancelled = app.order_action(app.buyer, early.id, cancel("ordered twice")).await.unwrap();
  assert_eq!(cancelled.status, OrderStatus::Cancelled);
  assert_eq!(cancelled.cancellation_reason.as_deref(), Some("ordered twice"));

  let late = app.checkout_direct(10, PaymentPlan::Full).await.unwrap();
  app.pay(late.id, "full_paid", "tx-1", 25000).await.unwrap();
  for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped] {
    app.order_action(app.supplier, late.id, advance(status)).await.unwrap();
  }
  let err = app.order_action(app.buyer, late.id, cancel("changed my mind")).await.unwrap_err();
  assert!(
    matches!(err, AppError::Lifecycle(LifecycleError::NotCancellable { status: "shipped" })),
    "{err:?}"
  );
  assert_eq!(actix_web::ResponseError::status_code(&err).as_u16(), 409);

  // payment after cancellation is refused
  let err = app.pay(early.id, "full_paid", "tx-2", 25000).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::Closed { .. })), "{err:?}");
}

#[tokio::test]
async fn fulfilment_is_driven_by_the_supplier_along_the_transition_table() {
  let app = spawn_app().await;
  let order = app.checkout_direct(10, PaymentPlan::Full).await.unwrap();
  app.pay(order.id, "full_paid", "tx-1", 25000).await.unwrap();

  let err = app
    .order_action(app.buyer, order.id, advance(OrderStatus::Confirmed))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");

  let other_supplier = Actor::new(Uuid::new_v4(), Role::Supplier);
  let err = app
    .order_action(other_supplier, order.id, advance(OrderStatus::Confirmed))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::NotParty { .. })), "{err:?}");

  let err = app
    .order_action(app.supplier, order.id, advance(OrderStatus::Shipped))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::InvalidTransition { .. })), "{err:?}");

  deliver(&app, order.id).await;
  let returned = app
    .order_action(app.admin, order.id, advance(OrderStatus::Returned))
    .await
    .unwrap();
  assert_eq!(returned.status, OrderStatus::Returned);
  assert!(app.state.notifier.sent_to(app.buyer.user_id).len() >= 5);
}

#[tokio::test]
async fn invoice_is_issued_once_after_payment() {
  let app = spawn_app().await;
  let order = app.checkout_direct(10, PaymentPlan::Full).await.unwrap();

  let err = app.order_action(app.buyer, order.id, IssueInvoice).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::Validation(_))), "{err:?}");

  app.pay(order.id, "full_paid", "tx-1", 25000).await.unwrap();
  let invoiced = app.order_action(app.buyer, order.id, IssueInvoice).await.unwrap();
  let url = invoiced.invoice_url.clone().unwrap();
  assert!(url.ends_with(&format!("/invoices/{}.pdf", order.id)), "{url}");

  app.clock.advance(Duration::hours(1));
  let again = app.order_action(app.supplier, order.id, IssueInvoice).await.unwrap();
  assert_eq!(again.invoice_url.as_deref(), Some(url.as_str()));
  assert_eq!(again.invoice_generated_at, Some(t0()));
}

#[tokio::test]
async fn overdue_rfqs_read_as_expired_and_the_sweep_persists_it() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let open = app.submit_rfq(50).await.unwrap();

  app.clock.advance(Duration::days(15));
  let stored = app.store.get_rfq(rfq.id).await.unwrap();
  assert_eq!(stored.status, RfqStatus::Pending);
  assert_eq!(stored.effective_status(app.now()), RfqStatus::Expired);

  // quoting an overdue RFQ fails and stores the expiry
  let err = app.submit_quote(rfq.id, 100, 0).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::Expired { .. })), "{err:?}");
  assert_eq!(app.store.get_rfq(rfq.id).await.unwrap().status, RfqStatus::Expired);

  let ctx_data = ContextData::new(ExpireRfqsCtxData {
    app_state: app.state.clone(),
    now: app.now(),
    due: Vec::new(),
    expired: Vec::new(),
    skipped: Vec::new(),
  });
  app.state.flows.run(ctx_data.clone()).await.unwrap();
  assert_eq!(ctx_data.read().expired, vec![open.id]);
  assert_eq!(app.store.get_rfq(open.id).await.unwrap().status, RfqStatus::Expired);
}
