// apps/marketplace/src/services/mod.rs

//! Simulated external services.

pub mod notifier;
pub mod payment_gateway;

pub use notifier::{Notification, Notifier};
pub use payment_gateway::{PaymentIntent, WebhookPayload};
