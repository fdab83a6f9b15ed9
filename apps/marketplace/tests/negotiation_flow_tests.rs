// apps/marketplace/tests/negotiation_flow_tests.rs
mod common;

use chrono::Duration;
use common::*;
use marketplace_app::config::AppConfig;
use marketplace_app::db::MarketplaceStore;
use marketplace_app::errors::AppError;
use marketplace_app::models::{Actor, Role};
use marketplace_app::pipelines::contexts::{AcceptQuote, CounterQuote, RejectQuote, ReviseQuote};
use tradeflow::{LifecycleError, QuoteStatus, Revision, RevisionKind, RfqStatus};
use uuid::Uuid;

fn reject(reason: &str) -> RejectQuote {
  RejectQuote {
    reason: reason.to_string(),
  }
}

fn counter(price: i64) -> CounterQuote {
  CounterQuote {
    counter_price_cents: price,
    note: Some("Can you meet us here?".to_string()),
  }
}

fn revise(price: i64) -> ReviseQuote {
  ReviseQuote {
    revision: Revision {
      unit_price_cents: price,
      agreed_quantity: None,
      valid_until: None,
      terms: None,
      delivery_time: None,
      note: Some("Best we can do".to_string()),
    },
  }
}

#[tokio::test]
async fn rfq_goes_to_the_product_supplier_and_quote_marks_it_quoted() {
  let app = spawn_app().await;

  let rfq = app.submit_rfq(100).await.unwrap();
  assert_eq!(rfq.supplier_id, app.supplier.user_id);
  assert_eq!(rfq.status, RfqStatus::Pending);
  assert_eq!(rfq.expires_at, t0() + Duration::days(14));
  assert_eq!(app.state.notifier.sent_to(app.supplier.user_id).len(), 1);

  let quote = app.submit_quote(rfq.id, 95, 30).await.unwrap();
  assert_eq!(quote.status, QuoteStatus::Pending);
  assert_eq!(quote.total_price_cents, 9500);

  let stored = app.store.get_rfq(rfq.id).await.unwrap();
  assert_eq!(stored.status, RfqStatus::Quoted);
  let history = app.store.list_revisions(rfq.id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].kind, RevisionKind::Offered);
}

#[tokio::test]
async fn only_buyers_submit_rfqs_and_only_the_addressed_supplier_quotes() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();

  let stranger = Actor::new(Uuid::new_v4(), Role::Supplier);
  let err = app
    .submit_quote_as(stranger, rfq.id, quote_request(95, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::NotParty { .. })), "{err:?}");

  let err = app
    .submit_quote_as(app.buyer, rfq.id, quote_request(95, 0))
    .await
    .unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");
}

#[tokio::test]
async fn accepting_a_quote_withdraws_its_live_siblings() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let first = app.submit_quote(rfq.id, 100, 0).await.unwrap();
  let second = app.submit_quote(rfq.id, 98, 0).await.unwrap();

  let accepted = app.negotiate(app.buyer, second.id, AcceptQuote).await.unwrap();
  assert_eq!(accepted.status, QuoteStatus::Accepted);

  let sibling = app.store.get_quote(first.id).await.unwrap();
  assert_eq!(sibling.status, QuoteStatus::Rejected);
  assert_eq!(sibling.rejection_reason.as_deref(), Some(tradeflow::lifecycle::quote::SIBLING_ACCEPTED_REASON));
  assert_eq!(app.store.get_rfq(rfq.id).await.unwrap().status, RfqStatus::Accepted);

  // the withdrawn sibling can no longer be accepted
  let err = app.negotiate(app.buyer, first.id, AcceptQuote).await.unwrap_err();
  assert_eq!(actix_web::ResponseError::status_code(&err).as_u16(), 409);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_leave_exactly_one_accepted_quote() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let a = app.submit_quote(rfq.id, 100, 0).await.unwrap();
  let b = app.submit_quote(rfq.id, 99, 0).await.unwrap();

  let (state, buyer) = (app.state.clone(), app.buyer);
  let accept = |quote_id: Uuid| {
    let state = state.clone();
    tokio::spawn(async move {
      let ctx_data = tradeflow::ContextData::new(marketplace_app::pipelines::contexts::NegotiationCtxData::new(
        state.clone(),
        buyer,
        quote_id,
        AcceptQuote,
      ));
      state.flows.run(ctx_data).await
    })
  };
  let (ra, rb) = tokio::join!(accept(a.id), accept(b.id));
  let results = [ra.unwrap(), rb.unwrap()];

  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
  let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
  assert_eq!(actix_web::ResponseError::status_code(loser).as_u16(), 409, "{loser:?}");

  let quotes = app.store.list_quotes(rfq.id).await.unwrap();
  assert_eq!(quotes.iter().filter(|q| q.status == QuoteStatus::Accepted).count(), 1);
  assert_eq!(app.store.get_rfq(rfq.id).await.unwrap().status, RfqStatus::Accepted);
}

#[tokio::test]
async fn rejecting_the_last_live_quote_rejects_the_rfq() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let first = app.submit_quote(rfq.id, 100, 0).await.unwrap();
  let second = app.submit_quote(rfq.id, 99, 0).await.unwrap();

  app.negotiate(app.buyer, first.id, reject("too expensive")).await.unwrap();
  assert_eq!(app.store.get_rfq(rfq.id).await.unwrap().status, RfqStatus::Quoted);

  let rejected = app.negotiate(app.buyer, second.id, reject("still too expensive")).await.unwrap();
  assert_eq!(rejected.rejection_reason.as_deref(), Some("still too expensive"));
  assert_eq!(app.store.get_rfq(rfq.id).await.unwrap().status, RfqStatus::Rejected);

  let err = app.negotiate(app.buyer, first.id, reject("again")).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::InvalidTransition { .. })), "{err:?}");
}

#[tokio::test]
async fn counter_and_revise_alternate_and_are_recorded() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let quote = app.submit_quote(rfq.id, 100, 0).await.unwrap();

  let countered = app.negotiate(app.buyer, quote.id, counter(90)).await.unwrap();
  assert_eq!(countered.status, QuoteStatus::Countered);
  assert_eq!(countered.counter_price_cents, Some(90));

  // the buyer cannot revise, the supplier can
  let err = app.negotiate(app.buyer, quote.id, revise(95)).await.unwrap_err();
  assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");
  let revised = app.negotiate(app.supplier, quote.id, revise(95)).await.unwrap();
  assert_eq!(revised.status, QuoteStatus::Pending);
  assert_eq!(revised.unit_price_cents, 95);
  assert_eq!(revised.total_price_cents, 9500);
  assert_eq!(revised.revision, 2);
  assert_eq!(revised.counter_price_cents, None);

  let kinds: Vec<RevisionKind> = app
    .store
    .list_revisions(rfq.id)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.kind)
    .collect();
  assert_eq!(kinds, vec![RevisionKind::Offered, RevisionKind::Countered, RevisionKind::Revised]);

  let accepted = app.negotiate(app.buyer, quote.id, AcceptQuote).await.unwrap();
  assert_eq!(accepted.unit_price_cents, 95);
}

#[tokio::test]
async fn counter_rounds_are_capped() {
  let app = spawn_app_with(AppConfig {
    max_counter_rounds: 2,
    ..AppConfig::default()
  })
  .await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let quote = app.submit_quote(rfq.id, 100, 0).await.unwrap();

  for price in [80, 85] {
    app.negotiate(app.buyer, quote.id, counter(price)).await.unwrap();
    app.negotiate(app.supplier, quote.id, revise(97)).await.unwrap();
  }
  let err = app.negotiate(app.buyer, quote.id, counter(90)).await.unwrap_err();
  assert!(
    matches!(err, AppError::Lifecycle(LifecycleError::CounterLimitReached { max: 2 })),
    "{err:?}"
  );
}

#[tokio::test]
async fn another_buyer_cannot_touch_the_quote() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let quote = app.submit_quote(rfq.id, 100, 0).await.unwrap();

  let intruder = Actor::new(Uuid::new_v4(), Role::Buyer);
  let err = app.negotiate(intruder, quote.id, AcceptQuote).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::NotParty { .. })), "{err:?}");
  assert_eq!(app.store.get_quote(quote.id).await.unwrap().status, QuoteStatus::Pending);
}

#[tokio::test]
async fn expired_quote_cannot_be_accepted() {
  let app = spawn_app().await;
  let rfq = app.submit_rfq(100).await.unwrap();
  let quote = app.submit_quote(rfq.id, 100, 0).await.unwrap();

  app.clock.advance(Duration::days(8));
  let err = app.negotiate(app.buyer, quote.id, AcceptQuote).await.unwrap_err();
  assert!(matches!(err, AppError::Lifecycle(LifecycleError::Expired { .. })), "{err:?}");
}
