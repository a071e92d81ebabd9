use std::sync::Arc;
use std::time::Duration;

use crate::app::adb::runner::{CommandExecutor, ProcessRunner};
use crate::app::config::AppConfig;

/// Process-wide handles shared by every command.
pub struct AppState {
    pub config: AppConfig,
    pub runner: Arc<ProcessRunner>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let runner = Arc::new(ProcessRunner::from_config(&config));
        Self { config, runner }
    }

    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        self.runner.clone()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.device.poll_interval_ms)
    }
}
