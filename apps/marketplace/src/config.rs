// apps/marketplace/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use tradeflow::EscrowPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
  Postgres,
  Memory,
}

impl FromStr for StoreBackend {
  type Err = AppError;

  fn from_str(value: &str) -> Result<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "postgres" | "pg" => Ok(StoreBackend::Postgres),
      "memory" | "mem" => Ok(StoreBackend::Memory),
      other => Err(AppError::Config(format!(
        "Invalid STORE_BACKEND '{}': expected 'postgres' or 'memory'",
        other
      ))),
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub store_backend: StoreBackend,
  /// Required for the postgres backend.
  pub database_url: Option<String>,
  pub run_migrations: bool,
  pub app_base_url: String,

  pub rfq_default_ttl_days: i64,
  pub escrow_release_days: i64,
  pub max_counter_rounds: u32,

  /// When set, payment webhooks must carry it in `X-Webhook-Secret`.
  pub webhook_secret: Option<String>,
  pub notification_sender: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      store_backend: StoreBackend::Memory,
      database_url: None,
      run_migrations: false,
      app_base_url: "http://127.0.0.1:8080".to_string(),
      rfq_default_ttl_days: 14,
      escrow_release_days: tradeflow::lifecycle::escrow::DEFAULT_RELEASE_DAYS,
      max_counter_rounds: 5,
      webhook_secret: None,
      notification_sender: "noreply@tradeflow.example".to_string(),
    }
  }
}

fn parse_var<T>(var_name: &str, raw: String) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let get_or = |var_name: &str, default: &str| get_env(var_name).unwrap_or_else(|_| default.to_string());

    let server_host = get_or("SERVER_HOST", "127.0.0.1");
    let server_port: u16 = parse_var("SERVER_PORT", get_or("SERVER_PORT", "8080"))?;
    let store_backend: StoreBackend = get_or("STORE_BACKEND", "postgres").parse()?;
    let database_url = get_env("DATABASE_URL").ok();
    if store_backend == StoreBackend::Postgres && database_url.is_none() {
      return Err(AppError::Config(
        "DATABASE_URL is required when STORE_BACKEND=postgres".to_string(),
      ));
    }
    let run_migrations: bool = parse_var("RUN_MIGRATIONS", get_or("RUN_MIGRATIONS", "false"))?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));

    let rfq_default_ttl_days: i64 = parse_var("RFQ_DEFAULT_TTL_DAYS", get_or("RFQ_DEFAULT_TTL_DAYS", "14"))?;
    let escrow_release_days: i64 = parse_var("ESCROW_RELEASE_DAYS", get_or("ESCROW_RELEASE_DAYS", "3"))?;
    let max_counter_rounds: u32 = parse_var("MAX_COUNTER_ROUNDS", get_or("MAX_COUNTER_ROUNDS", "5"))?;
    if rfq_default_ttl_days < 1 {
      return Err(AppError::Config("RFQ_DEFAULT_TTL_DAYS must be at least 1".to_string()));
    }
    if escrow_release_days < 0 {
      return Err(AppError::Config("ESCROW_RELEASE_DAYS must not be negative".to_string()));
    }

    let webhook_secret = get_env("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());
    let notification_sender = get_or("NOTIFICATION_SENDER", "noreply@tradeflow.example");

    tracing::info!(
      backend = ?store_backend,
      rfq_default_ttl_days,
      escrow_release_days,
      max_counter_rounds,
      webhook_secret_set = webhook_secret.is_some(),
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      store_backend,
      database_url,
      run_migrations,
      app_base_url,
      rfq_default_ttl_days,
      escrow_release_days,
      max_counter_rounds,
      webhook_secret,
      notification_sender,
    })
  }

  pub fn rfq_default_ttl(&self) -> chrono::Duration {
    chrono::Duration::days(self.rfq_default_ttl_days)
  }

  pub fn escrow_policy(&self) -> EscrowPolicy {
    EscrowPolicy::from_days(self.escrow_release_days)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backend_names() {
    assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
    assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
    assert!("redis".parse::<StoreBackend>().is_err());
  }

  #[test]
  fn invalid_numbers_are_config_errors() {
    let err = parse_var::<u16>("SERVER_PORT", "eighty".to_string()).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("SERVER_PORT")));
  }
}
