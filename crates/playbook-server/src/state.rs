use std::path::PathBuf;
use std::sync::Arc;

use playbook_core::config::AnalyticsConfig;

use crate::refresher::Refresher;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub refresher: Arc<Refresher>,
}

impl AppState {
    pub fn new(root: PathBuf, refresher: Arc<Refresher>) -> Self {
        Self { root, refresher }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        self.refresher.config()
    }
}
