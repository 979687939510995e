//! Application state.

use std::sync::Arc;

use vdetect_worker::{JobExecutor, JobTable, Workspace};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub executor: Arc<JobExecutor>,
}

impl AppState {
    /// Create new application state around a running executor.
    pub fn new(config: ApiConfig, executor: Arc<JobExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn jobs(&self) -> &JobTable {
        self.executor.table()
    }

    pub fn workspace(&self) -> &Workspace {
        self.executor.workspace()
    }
}
