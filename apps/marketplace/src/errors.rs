// apps/marketplace/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use tradeflow::{FlowError, LifecycleError};

use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("{0}")]
  Lifecycle(#[from] LifecycleError),

  #[error("Payment Processing Error: {0}")]
  Payment(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),

  // An HTTP handler may treat a gracefully stopped flow as a failed request.
  #[error("Pipeline execution was halted by a handler.")]
  PipelineHaltedByHandler,
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound { entity, id } => AppError::NotFound(format!("{} {} not found", entity, id)),
      StoreError::Conflict { .. } => AppError::Conflict(err.to_string()),
      StoreError::Sqlx(e) => AppError::Sqlx(e),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    let err = match err.downcast::<AppError>() {
      Ok(app_err) => return app_err,
      Err(err) => err,
    };
    let err = match err.downcast::<LifecycleError>() {
      Ok(lifecycle) => return AppError::Lifecycle(lifecycle),
      Err(err) => err,
    };
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(err) => AppError::Internal(err.to_string()),
    }
  }
}

/// Stable machine-readable code for a lifecycle violation.
fn lifecycle_code(err: &LifecycleError) -> &'static str {
  match err {
    LifecycleError::InvalidTransition { .. } => "invalid_transition",
    LifecycleError::UnknownStatus { .. } => "unknown_status",
    LifecycleError::Expired { .. } => "expired",
    LifecycleError::Closed { .. } => "closed",
    LifecycleError::AlreadyAccepted { .. } => "already_accepted",
    LifecycleError::NotParty { .. } => "not_a_party",
    LifecycleError::NotCancellable { .. } => "not_cancellable",
    LifecycleError::AwaitingPayment { .. } => "awaiting_payment",
    LifecycleError::PlanMismatch { .. } => "plan_mismatch",
    LifecycleError::AmountMismatch { .. } => "amount_mismatch",
    LifecycleError::EscrowNotReleasable(_) => "escrow_not_releasable",
    LifecycleError::CounterLimitReached { .. } => "counter_limit_reached",
    LifecycleError::Validation(_) => "validation",
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) | AppError::PipelineHaltedByHandler => StatusCode::CONFLICT,
      AppError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
      AppError::Lifecycle(err) => match err {
        LifecycleError::Validation(_) | LifecycleError::UnknownStatus { .. } => StatusCode::BAD_REQUEST,
        LifecycleError::NotParty { .. } => StatusCode::FORBIDDEN,
        LifecycleError::PlanMismatch { .. }
        | LifecycleError::AmountMismatch { .. }
        | LifecycleError::AwaitingPayment { .. } => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::CONFLICT,
      },
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Request rejected");
    }

    let body = match self {
      AppError::Validation(m)
      | AppError::Auth(m)
      | AppError::Forbidden(m)
      | AppError::NotFound(m)
      | AppError::Conflict(m)
      | AppError::Payment(m) => json!({"error": m}),
      AppError::Lifecycle(err) => json!({"error": err.to_string(), "code": lifecycle_code(err)}),
      AppError::Config(m) => json!({"error": "Configuration issue", "detail": m}),
      AppError::Sqlx(_) => json!({"error": "Database operation failed"}),
      AppError::Workflow { source } => {
        tracing::error!(flow_error_source = ?source, "Workflow error details");
        json!({"error": "Workflow processing error", "detail": source.to_string()})
      }
      AppError::Internal(m) => json!({"error": "An internal error occurred", "detail": m}),
      AppError::PipelineHaltedByHandler => json!({"error": "Process halted as expected by business logic."}),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
