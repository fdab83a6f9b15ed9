// src/lib.rs

//! Tradeflow: the commerce lifecycle model of a B2B wholesale marketplace and
//! the async step-flow engine its operations run on.
//!
//! The [`lifecycle`] module holds the status machines:
//!  - RFQ: pending, quoted, accepted, rejected, expired, converted.
//!  - Quote: pending, accepted, rejected, countered, with an append-only
//!    negotiation history.
//!  - Order fulfilment and payment/escrow sub-states, deposit arithmetic and
//!    checkout drafts.
//!
//! Every status enum implements [`Lifecycle`], so there is exactly one
//! transition table per entity and one validating `transition` entry point.
//!
//! The [`flow`] module is a small workflow engine: named steps with
//! before/on/after hooks over shared [`ContextData`], early stop, optional
//! steps and a type-keyed [`FlowRegistry`].

pub mod error;
pub mod flow;
pub mod lifecycle;

// --- Re-exports for the Public API ---

pub use crate::error::{FlowError, FlowResult};
pub use crate::flow::{ContextData, FlowRegistry, Pipeline, PipelineControl, PipelineResult, SkipCondition};

pub use crate::lifecycle::checkout::{DirectLine, OrderDraft};
pub use crate::lifecycle::error::{LifecycleError, LifecycleResult};
pub use crate::lifecycle::escrow::{EscrowPolicy, ReleaseTrigger};
pub use crate::lifecycle::expiry::{is_expired, Expiring};
pub use crate::lifecycle::machine::{Lifecycle, TransitionTable};
pub use crate::lifecycle::money::{line_total, DepositSplit};
pub use crate::lifecycle::negotiation::{NegotiationLog, QuoteRevision, RevisionKind};
pub use crate::lifecycle::order::{DisputeStatus, Order, OrderItem, OrderStatus};
pub use crate::lifecycle::payment::{PaymentEvent, PaymentPlan, PaymentStatus};
pub use crate::lifecycle::quote::{NewQuote, Quote, QuoteStatus, Revision};
pub use crate::lifecycle::rfq::{NewRfq, Rfq, RfqStatus};
