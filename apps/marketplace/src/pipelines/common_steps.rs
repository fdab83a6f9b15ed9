// apps/marketplace/src/pipelines/common_steps.rs
use crate::db::ChangeSet;
use crate::errors::{AppError, Result as AppResult};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use tradeflow::{PipelineControl, Rfq};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Clones a value an earlier step should have put into the context.
pub fn loaded<T: Clone>(slot: &Option<T>, what: &str) -> AppResult<T> {
  slot
    .clone()
    .ok_or_else(|| AppError::Internal(format!("{} was not loaded by an earlier step", what)))
}

/// Writes the expiry of an overdue RFQ before anything else looks at it, so a
/// write path that meets an expired RFQ leaves it `expired` in storage even
/// when the operation itself then fails. Returns whether the RFQ changed.
#[instrument(name = "common_step::materialize_expiry", skip(app_state, rfq), fields(rfq_id = %rfq.id))]
pub async fn materialize_expiry(app_state: &AppState, rfq: &mut Rfq, now: DateTime<Utc>) -> AppResult<bool> {
  if !rfq.needs_expiry(now) {
    return Ok(false);
  }
  let mut expired = rfq.clone();
  expired.expire_if_due(now);
  let mut changes = ChangeSet::new();
  changes.update_rfq(&mut expired);
  app_state.store.commit(changes).await?;
  info!("RFQ {} was overdue since {} and is now expired.", rfq.id, rfq.expires_at);
  *rfq = expired;
  Ok(true)
}

/// Body of every optional `notify_*` step. A failed notification is logged
/// and never fails the flow.
#[instrument(name = "common_step::notify", skip(app_state, body), fields(to_user = %to_user))]
pub async fn notify_step(
  app_state: &AppState,
  to_user: Uuid,
  subject: &str,
  body: &str,
  now: DateTime<Utc>,
) -> AppResult<PipelineControl> {
  match app_state.notifier.send(to_user, subject, body, now).await {
    Ok(sent) => info!("Notification '{}' sent to {} ({}).", subject, to_user, sent.message_id),
    Err(e) => warn!("Failed to notify {} about '{}': {}", to_user, subject, e),
  }
  Ok(PipelineControl::Continue)
}
