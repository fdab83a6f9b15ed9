// tradeflow/src/lifecycle/negotiation.rs

//! Append-only negotiation history of an RFQ.
//!
//! Quotes are mutated in place, so every offer, counter, revision and decision
//! is also appended here. Revisions are keyed by `(rfq_id, seq)`, with `seq`
//! starting at 1 and never skipping a number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::machine::wire_names;
use crate::lifecycle::quote::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
  Offered,
  Countered,
  Revised,
  Accepted,
  Rejected,
}

wire_names!(RevisionKind, "quote_revision", {
  Offered => "offered",
  Countered => "countered",
  Revised => "revised",
  Accepted => "accepted",
  Rejected => "rejected",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QuoteRevision {
  pub rfq_id: Uuid,
  pub seq: i32,
  pub quote_id: Uuid,
  #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
  pub kind: RevisionKind,
  pub unit_price_cents: Option<i64>,
  pub quantity: Option<i32>,
  pub note: Option<String>,
  pub actor_id: Uuid,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiationLog {
  rfq_id: Uuid,
  revisions: Vec<QuoteRevision>,
}

impl NegotiationLog {
  pub fn new(rfq_id: Uuid) -> Self {
    Self {
      rfq_id,
      revisions: Vec::new(),
    }
  }

  /// Rebuilds a log from stored rows, in any order. Rows from another RFQ or
  /// a gap in the sequence are rejected.
  pub fn from_revisions(rfq_id: Uuid, mut revisions: Vec<QuoteRevision>) -> LifecycleResult<Self> {
    revisions.sort_by_key(|r| r.seq);
    for (idx, revision) in revisions.iter().enumerate() {
      if revision.rfq_id != rfq_id {
        return Err(LifecycleError::Validation(format!(
          "revision {} belongs to RFQ {}, not {}",
          revision.seq, revision.rfq_id, rfq_id
        )));
      }
      let expected = idx as i32 + 1;
      if revision.seq != expected {
        return Err(LifecycleError::Validation(format!(
          "negotiation history of RFQ {rfq_id} expected seq {expected}, found {}",
          revision.seq
        )));
      }
    }
    Ok(Self { rfq_id, revisions })
  }

  pub fn rfq_id(&self) -> Uuid {
    self.rfq_id
  }

  pub fn entries(&self) -> &[QuoteRevision] {
    &self.revisions
  }

  pub fn len(&self) -> usize {
    self.revisions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.revisions.is_empty()
  }

  pub fn next_seq(&self) -> i32 {
    self.revisions.last().map(|r| r.seq + 1).unwrap_or(1)
  }

  /// Appends a revision and returns a copy for persistence.
  #[allow(clippy::too_many_arguments)]
  pub fn append(
    &mut self,
    quote_id: Uuid,
    kind: RevisionKind,
    actor_id: Uuid,
    unit_price_cents: Option<i64>,
    quantity: Option<i32>,
    note: Option<String>,
    now: DateTime<Utc>,
  ) -> QuoteRevision {
    let revision = QuoteRevision {
      rfq_id: self.rfq_id,
      seq: self.next_seq(),
      quote_id,
      kind,
      unit_price_cents,
      quantity,
      note,
      actor_id,
      created_at: now,
    };
    self.revisions.push(revision.clone());
    revision
  }

  /// Records the current terms of `quote` under `kind`. Counters record the
  /// buyer's price; everything else records the quote's own unit price.
  pub fn record(
    &mut self,
    quote: &Quote,
    kind: RevisionKind,
    actor_id: Uuid,
    note: Option<String>,
    now: DateTime<Utc>,
  ) -> QuoteRevision {
    let price = match kind {
      RevisionKind::Countered => quote.counter_price_cents,
      _ => Some(quote.unit_price_cents),
    };
    self.append(quote.id, kind, actor_id, price, Some(quote.agreed_quantity), note, now)
  }

  pub fn history(&self, quote_id: Uuid) -> impl Iterator<Item = &QuoteRevision> + '_ {
    self.revisions.iter().filter(move |r| r.quote_id == quote_id)
  }

  pub fn latest(&self, quote_id: Uuid) -> Option<&QuoteRevision> {
    self.revisions.iter().rev().find(|r| r.quote_id == quote_id)
  }

  /// Number of counter offers made on `quote_id`.
  pub fn rounds(&self, quote_id: Uuid) -> u32 {
    self
      .history(quote_id)
      .filter(|r| r.kind == RevisionKind::Countered)
      .count() as u32
  }

  pub fn ensure_counter_allowed(&self, quote_id: Uuid, max_rounds: u32) -> LifecycleResult<()> {
    if self.rounds(quote_id) >= max_rounds {
      Err(LifecycleError::CounterLimitReached { max: max_rounds })
    } else {
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
  }

  #[test]
  fn seq_is_gap_free_across_quotes() {
    let rfq_id = Uuid::new_v4();
    let (a, b, actor) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut log = NegotiationLog::new(rfq_id);

    log.append(a, RevisionKind::Offered, actor, Some(100), Some(10), None, now());
    log.append(b, RevisionKind::Offered, actor, Some(90), Some(10), None, now());
    let third = log.append(a, RevisionKind::Countered, actor, Some(80), Some(10), None, now());

    assert_eq!(third.seq, 3);
    assert_eq!(log.history(a).count(), 2);
    assert_eq!(log.latest(a).map(|r| r.kind), Some(RevisionKind::Countered));
    assert_eq!(log.rounds(a), 1);
    assert_eq!(log.rounds(b), 0);
  }

  #[test]
  fn counter_limit() {
    let rfq_id = Uuid::new_v4();
    let quote_id = Uuid::new_v4();
    let mut log = NegotiationLog::new(rfq_id);
    for _ in 0..2 {
      log.append(quote_id, RevisionKind::Countered, quote_id, Some(1), None, None, now());
    }
    assert!(log.ensure_counter_allowed(quote_id, 3).is_ok());
    assert_eq!(
      log.ensure_counter_allowed(quote_id, 2),
      Err(LifecycleError::CounterLimitReached { max: 2 })
    );
  }

  #[test]
  fn from_revisions_sorts_and_checks_gaps() {
    let rfq_id = Uuid::new_v4();
    let mut log = NegotiationLog::new(rfq_id);
    let q = Uuid::new_v4();
    let first = log.append(q, RevisionKind::Offered, q, None, None, None, now());
    let second = log.append(q, RevisionKind::Accepted, q, None, None, None, now());

    let rebuilt = NegotiationLog::from_revisions(rfq_id, vec![second.clone(), first.clone()]).unwrap();
    assert_eq!(rebuilt, log);

    assert!(NegotiationLog::from_revisions(rfq_id, vec![second]).is_err());
    assert!(NegotiationLog::from_revisions(Uuid::new_v4(), vec![first]).is_err());
  }
}
