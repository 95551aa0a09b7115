use std::sync::Arc;

use bruttus_agents::Conversation;
use bruttus_config::AppConfig;

/// Shared state behind every route: one conversation per process.
pub struct AppState {
    pub config: AppConfig,
    pub conversation: Arc<Conversation>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, conversation: Arc<Conversation>) -> Self {
        Self {
            config,
            conversation,
        }
    }
}
