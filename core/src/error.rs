// tradeflow/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Errors raised by the flow engine itself (as opposed to the business errors
/// returned by step handlers).
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Handler missing for non-optional step '{step_name}' in flow '{flow}'")]
  HandlerMissing { flow: &'static str, step_name: String },

  #[error("No flow registered for context type {type_name}")]
  NotRegistered { type_name: &'static str },

  #[error("Context type mismatch for flow '{flow}' (expected {expected_type})")]
  TypeMismatch {
    flow: &'static str,
    expected_type: &'static str,
  },

  #[error("Error in step handler or external operation. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },
}

impl From<AnyhowError> for FlowError {
  fn from(err: AnyhowError) -> Self {
    FlowError::HandlerError { source: err }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;
