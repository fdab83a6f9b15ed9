// apps/marketplace/src/services/notifier.rs
use crate::errors::{AppError, Result as AppResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
  pub to_user: Uuid,
  pub from: String,
  pub subject: String,
  pub body_preview: String, // First N chars of body
  pub message_id: String,
  pub sent_at: DateTime<Utc>,
}

/// Mock notification channel. Every message sent is kept in an outbox so
/// callers (and tests) can see what went out.
#[derive(Debug)]
pub struct Notifier {
  sender: String,
  outbox: Mutex<Vec<Notification>>,
}

impl Notifier {
  pub fn new(sender: impl Into<String>) -> Self {
    Self {
      sender: sender.into(),
      outbox: Mutex::new(Vec::new()),
    }
  }

  pub async fn send(&self, to_user: Uuid, subject: &str, body: &str, now: DateTime<Utc>) -> AppResult<Notification> {
    info!(
      "Simulating notification: To='{}', From='{}', Subject='{}'",
      to_user, self.sender, subject
    );
    tokio::time::sleep(std::time::Duration::from_millis(5)).await; // Simulate network latency

    if subject.to_lowercase().contains("fail_test") {
      warn!("Simulated notification failure for subject: {}", subject);
      return Err(AppError::Internal("Simulated notification failure".to_string()));
    }

    let notification = Notification {
      to_user,
      from: self.sender.clone(),
      subject: subject.to_string(),
      body_preview: body.chars().take(80).collect(),
      message_id: format!("mock_msg_{}", Uuid::new_v4()),
      sent_at: now,
    };
    info!("Mock notification sent. Message ID: {}", notification.message_id);
    self.outbox.lock().push(notification.clone());
    Ok(notification)
  }

  /// Messages sent to `user_id`, oldest first.
  pub fn sent_to(&self, user_id: Uuid) -> Vec<Notification> {
    self.outbox.lock().iter().filter(|n| n.to_user == user_id).cloned().collect()
  }

  pub fn sent_count(&self) -> usize {
    self.outbox.lock().len()
  }
}
