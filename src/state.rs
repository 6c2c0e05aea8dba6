//! Shared application state for request handlers.

use std::sync::Arc;

use crate::azure::SecretRetriever;
use crate::config::AppConfig;

/// Shared application state, cloneable across handlers.
///
/// Holds only immutable data: the resolved configuration and the retriever,
/// whose authentication strategy was fixed at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub secrets: SecretRetriever,
}

impl AppState {
    /// Creates a new application state from the given configuration and retriever.
    pub fn new(config: AppConfig, secrets: SecretRetriever) -> Self {
        Self {
            config: Arc::new(config),
            secrets,
        }
    }
}
