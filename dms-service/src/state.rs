//! Application state for the DMS service.

use std::sync::Arc;

use common::config::AppConfig;
use common::OpContext;

use crate::adapters::AdapterRegistry;
use crate::registry::ConnectionRegistry;
use crate::service::DatabaseService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<DatabaseService>,
}

impl AppState {
    /// Creates the state with the built-in vendor adapters.
    pub fn new(config: AppConfig) -> Self {
        let adapters = AdapterRegistry::with_defaults(&config.adapters);
        tracing::info!(vendors = ?adapters.vendors(), "vendor adapters registered");
        Self::with_adapters(config, adapters)
    }

    /// Creates the state with a caller-provided adapter map.
    pub fn with_adapters(config: AppConfig, adapters: AdapterRegistry) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(adapters, &config.pool));
        Self {
            service: Arc::new(DatabaseService::new(registry)),
            config: Arc::new(config),
        }
    }

    /// Context bounding one HTTP request.
    pub fn request_context(&self) -> OpContext {
        OpContext::background().with_timeout(self.config.server.request_timeout())
    }
}
