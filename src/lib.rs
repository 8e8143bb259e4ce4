pub mod config;
pub mod rest;
pub mod storage;
pub mod tasks;

use std::sync::Arc;

use config::TaskdConfig;
use storage::Storage;
use tasks::TaskService;

/// Shared application state passed to every HTTP handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<TaskdConfig>,
    pub tasks: Arc<TaskService>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: Arc<TaskdConfig>, storage: Arc<Storage>) -> Self {
        Self {
            config,
            tasks: Arc::new(TaskService::new(storage)),
            started_at: std::time::Instant::now(),
        }
    }
}
