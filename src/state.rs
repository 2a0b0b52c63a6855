//! Shared application state for request handlers.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::service::DecisionService;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub decisions: Arc<DecisionService>,
}

impl AppState {
    pub fn new(config: AppConfig, decisions: DecisionService) -> Self {
        Self {
            config: Arc::new(config),
            decisions: Arc::new(decisions),
        }
    }
}
