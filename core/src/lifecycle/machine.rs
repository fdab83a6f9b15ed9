// tradeflow/src/lifecycle/machine.rs

//! The `Lifecycle` trait shared by every status enum, and the helpers that give
//! those enums their canonical snake_case wire names.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::lifecycle::error::{LifecycleError, LifecycleResult};

/// Generates `VARIANTS`, `as_str`, `Display`, `FromStr` and `TryFrom<String>`
/// for a fieldless enum. The `TryFrom<String>` impl is what the sqlx feature
/// relies on to decode TEXT status columns.
macro_rules! wire_names {
  ($ty:ident, $entity:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
    impl $ty {
      pub const VARIANTS: &'static [$ty] = &[$($ty::$variant),+];

      pub fn as_str(self) -> &'static str {
        match self {
          $($ty::$variant => $name),+
        }
      }
    }

    impl std::fmt::Display for $ty {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl std::str::FromStr for $ty {
      type Err = $crate::lifecycle::error::LifecycleError;

      fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
          $($name => Ok($ty::$variant),)+
          other => Err($crate::lifecycle::error::LifecycleError::UnknownStatus {
            entity: $entity,
            value: other.to_string(),
          }),
        }
      }
    }

    impl TryFrom<String> for $ty {
      type Error = $crate::lifecycle::error::LifecycleError;

      fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
      }
    }
  };
}

pub(crate) use wire_names;

/// A finite status domain with an explicit transition table.
///
/// `allowed_next` is the table; everything else derives from it. Self-loops
/// are never edges, so `transition(s, s)` always fails.
pub trait Lifecycle: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
  /// Entity name used in errors and in the published tables.
  const ENTITY: &'static str;

  /// Every status, in declaration order.
  const ALL: &'static [Self];

  fn allowed_next(self) -> &'static [Self];

  fn name(self) -> &'static str;

  fn can_transition_to(self, next: Self) -> bool {
    self.allowed_next().contains(&next)
  }

  fn is_terminal(self) -> bool {
    self.allowed_next().is_empty()
  }

  /// Validates the edge `self -> next` and returns `next` when it exists.
  fn transition(self, next: Self) -> LifecycleResult<Self> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(LifecycleError::InvalidTransition {
        entity: Self::ENTITY,
        from: self.name(),
        to: next.name(),
      })
    }
  }
}

/// Serializable snapshot of one entity's transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionTable {
  pub entity: &'static str,
  pub statuses: Vec<&'static str>,
  pub terminal: Vec<&'static str>,
  pub transitions: BTreeMap<&'static str, Vec<&'static str>>,
}

impl TransitionTable {
  pub fn of<S: Lifecycle>() -> Self {
    let statuses = S::ALL.iter().map(|s| s.name()).collect();
    let terminal = S::ALL.iter().filter(|s| s.is_terminal()).map(|s| s.name()).collect();
    let transitions = S::ALL
      .iter()
      .map(|s| (s.name(), s.allowed_next().iter().map(|n| n.name()).collect()))
      .collect();

    Self {
      entity: S::ENTITY,
      statuses,
      terminal,
      transitions,
    }
  }

  pub fn allows(&self, from: &str, to: &str) -> bool {
    self
      .transitions
      .get(from)
      .map(|next| next.iter().any(|n| *n == to))
      .unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lifecycle::order::OrderStatus;
  use crate::lifecycle::payment::PaymentStatus;
  use crate::lifecycle::quote::QuoteStatus;
  use crate::lifecycle::rfq::RfqStatus;

  fn assert_table_consistent<S: Lifecycle>() {
    for status in S::ALL {
      assert!(!status.can_transition_to(*status), "{} {} has a self-loop", S::ENTITY, status);
      for next in status.allowed_next() {
        assert!(S::ALL.contains(next));
      }
      let parsed: Vec<&str> = S::ALL.iter().map(|s| s.name()).collect();
      assert!(parsed.contains(&status.to_string().as_str()));
    }
  }

  #[test]
  fn tables_have_no_self_loops() {
    assert_table_consistent::<RfqStatus>();
    assert_table_consistent::<QuoteStatus>();
    assert_table_consistent::<OrderStatus>();
    assert_table_consistent::<PaymentStatus>();
  }

  #[test]
  fn terminal_sets_match_the_model() {
    let rfq = TransitionTable::of::<RfqStatus>();
    assert_eq!(rfq.terminal, vec!["rejected", "expired", "converted"]);

    let quote = TransitionTable::of::<QuoteStatus>();
    assert_eq!(quote.terminal, vec!["accepted", "rejected"]);

    let order = TransitionTable::of::<OrderStatus>();
    assert_eq!(order.terminal, vec!["cancelled", "returned"]);

    let payment = TransitionTable::of::<PaymentStatus>();
    assert_eq!(payment.terminal, vec!["full_paid", "released"]);
  }

  #[test]
  fn transition_reports_both_ends() {
    let err = OrderStatus::Shipped.transition(OrderStatus::Cancelled).unwrap_err();
    assert_eq!(
      err,
      LifecycleError::InvalidTransition {
        entity: "order",
        from: "shipped",
        to: "cancelled",
      }
    );
  }

  #[test]
  fn table_lookup_by_wire_name() {
    let table = TransitionTable::of::<OrderStatus>();
    assert!(table.allows("shipped", "out_for_delivery"));
    assert!(!table.allows("delivered", "shipped"));
    assert!(!table.allows("nonsense", "placed"));
  }

  #[test]
  fn wire_names_round_trip_through_from_str() {
    for status in OrderStatus::ALL {
      let parsed: OrderStatus = status.as_str().parse().unwrap();
      assert_eq!(parsed, *status);
    }
    let err = "shipping".parse::<OrderStatus>().unwrap_err();
    assert!(matches!(err, LifecycleError::UnknownStatus { entity: "order", .. }));
  }
}
