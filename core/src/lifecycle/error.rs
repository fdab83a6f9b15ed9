// tradeflow/src/lifecycle/error.rs
use thiserror::Error;
use uuid::Uuid;

/// Violations of the lifecycle rules. Every status change and every checkout
/// draft reports failures through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
  #[error("Invalid {entity} transition from '{from}' to '{to}'")]
  InvalidTransition {
    entity: &'static str,
    from: &'static str,
    to: &'static str,
  },

  #[error("Unknown {entity} value '{value}'")]
  UnknownStatus { entity: &'static str, value: String },

  #[error("{entity} {id} has expired")]
  Expired { entity: &'static str, id: Uuid },

  #[error("{entity} {id} is {status} and no longer accepts this action")]
  Closed {
    entity: &'static str,
    id: Uuid,
    status: &'static str,
  },

  #[error("RFQ {rfq_id} already has an accepted quote")]
  AlreadyAccepted { rfq_id: Uuid },

  #[error("User {user_id} is not a party to {entity} {id}")]
  NotParty {
    entity: &'static str,
    id: Uuid,
    user_id: Uuid,
  },

  #[error("Order in status '{status}' cannot be cancelled")]
  NotCancellable { status: &'static str },

  #[error("Order {id} has no payment yet and cannot move to '{to}'")]
  AwaitingPayment { id: Uuid, to: &'static str },

  #[error("Payment plan '{plan}' does not allow payment status '{status}'")]
  PlanMismatch {
    plan: &'static str,
    status: &'static str,
  },

  #[error("Payment amount mismatch: expected {expected} cents, received {actual}")]
  AmountMismatch { expected: i64, actual: i64 },

  #[error("Escrow cannot be released: {0}")]
  EscrowNotReleasable(String),

  #[error("Negotiation limit of {max} counter offers reached")]
  CounterLimitReached { max: u32 },

  #[error("Validation failed: {0}")]
  Validation(String),
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
