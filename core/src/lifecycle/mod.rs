// tradeflow/src/lifecycle/mod.rs

//! The commerce lifecycle state model.
//!
//! Three linked entities (RFQ, quote, order) and the payment sub-state of an
//! order, each governed by an explicit transition table. Entities only change
//! status through their validating methods; handlers never assign a status
//! field directly.

pub mod machine;

pub mod checkout;
pub mod error;
pub mod escrow;
pub mod expiry;
pub mod money;
pub mod negotiation;
pub mod order;
pub mod payment;
pub mod quote;
pub mod rfq;

pub use machine::{Lifecycle, TransitionTable};
