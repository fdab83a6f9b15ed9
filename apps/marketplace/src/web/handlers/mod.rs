// apps/marketplace/src/web/handlers/mod.rs

pub mod address_handlers;
pub mod admin_handlers;
pub mod checkout_handlers;
pub mod meta_handlers;
pub mod order_handlers;
pub mod product_handlers;
pub mod quote_handlers;
pub mod rfq_handlers;
pub mod webhook_handlers;

use crate::errors::{AppError, Result as AppResult};
use crate::state::AppState;
use tradeflow::{ContextData, PipelineResult};
use tracing::warn;

/// Runs the flow registered for `T` and hands back the context for reading
/// the outcome.
pub(crate) async fn run_flow<T>(state: &AppState, data: T) -> AppResult<(PipelineResult, ContextData<T>)>
where
  T: Send + Sync + 'static,
{
  let ctx_data = ContextData::new(data);
  let result = state.flows.run(ctx_data.clone()).await?;
  Ok((result, ctx_data))
}

/// For flows that never stop early on purpose.
pub(crate) fn expect_completed(flow: &str, result: PipelineResult) -> AppResult<()> {
  match result {
    PipelineResult::Completed => Ok(()),
    PipelineResult::Stopped => {
      warn!("Flow '{}' was stopped by a handler.", flow);
      Err(AppError::PipelineHaltedByHandler)
    }
  }
}
