// tradeflow/src/lifecycle/expiry.rs

//! The one expiry predicate used by every read and write path.

use chrono::{DateTime, Duration, Utc};

/// Anything with a hard deadline: RFQs (`expires_at`) and quotes
/// (`valid_until`).
pub trait Expiring {
  fn expires_at(&self) -> DateTime<Utc>;
}

/// `true` once the deadline lies strictly in the past. At the exact deadline
/// the entity is still live.
pub fn is_expired<E: Expiring + ?Sized>(entity: &E, now: DateTime<Utc>) -> bool {
  entity.expires_at() < now
}

/// Time left before expiry, zero once expired.
pub fn remaining<E: Expiring + ?Sized>(entity: &E, now: DateTime<Utc>) -> Duration {
  let left = entity.expires_at() - now;
  if left < Duration::zero() {
    Duration::zero()
  } else {
    left
  }
}
