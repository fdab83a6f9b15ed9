// apps/marketplace/src/pipelines/mod.rs

//! Every marketplace operation that writes is a flow registered here.

use crate::errors::AppError;
use crate::state::AppState;
use tradeflow::FlowRegistry;

pub mod common_steps;
pub mod contexts;

pub mod address_pipeline;
pub mod admin_pipeline;
pub mod checkout_pipeline;
pub mod negotiation_pipeline;
pub mod order_pipeline;
pub mod quote_pipeline;
pub mod rfq_pipeline;
pub mod webhook_pipeline;

/// Registers every flow with `flows`. Called once at startup.
pub fn register_all_pipelines(flows: &FlowRegistry<AppError>, app_state: &AppState) {
  tracing::info!("Registering marketplace flows...");

  rfq_pipeline::register_rfq_pipelines(flows, app_state);
  quote_pipeline::register_quote_pipelines(flows, app_state);
  negotiation_pipeline::register_negotiation_pipelines(flows, app_state);
  checkout_pipeline::register_checkout_pipeline(flows, app_state);
  order_pipeline::register_order_pipelines(flows, app_state);
  webhook_pipeline::register_webhook_pipeline(flows, app_state);
  address_pipeline::register_address_pipeline(flows, app_state);
  admin_pipeline::register_admin_pipelines(flows, app_state);

  tracing::info!(flows = ?flows.flow_names(), "All marketplace flows registered.");
}
