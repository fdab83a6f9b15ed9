// apps/marketplace/src/state.rs
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db::MarketplaceStore;
use crate::errors::AppError;
use crate::services::Notifier;
use std::sync::Arc;
use tradeflow::FlowRegistry;

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn MarketplaceStore>,
  pub flows: Arc<FlowRegistry<AppError>>,
  pub config: Arc<AppConfig>,
  pub clock: Arc<dyn Clock>,
  pub notifier: Arc<Notifier>,
}

impl AppState {
  /// State with an empty flow registry; call
  /// [`crate::pipelines::register_all_pipelines`] before serving.
  pub fn new(store: Arc<dyn MarketplaceStore>, config: Arc<AppConfig>) -> Self {
    let notifier = Arc::new(Notifier::new(config.notification_sender.clone()));
    Self {
      store,
      flows: Arc::new(FlowRegistry::new()),
      config,
      clock: Arc::new(SystemClock),
      notifier,
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }
}
