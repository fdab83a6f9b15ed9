// apps/marketplace/src/lib.rs

//! HTTP service of the wholesale marketplace: RFQs, quote negotiation,
//! checkout, payment webhooks, fulfilment and escrow, each operation running as
//! a `tradeflow` flow over a [`db::MarketplaceStore`].

pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod web;
