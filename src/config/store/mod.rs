//! Where configuration comes from.
//!
//! The daemon reads configuration at start and again on every reload
//! trigger (admin API, SIGHUP, file watcher). Each trigger goes through a
//! [`ConfigStore`].

mod file;
mod memory;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;

use async_trait::async_trait;
use std::sync::Arc;

use super::{Config, ConfigError};

/// Configuration source.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read and validate the current configuration.
    async fn load(&self) -> Result<Config, ConfigError>;

    /// Persist a configuration. Invalid configurations are refused.
    async fn save(&self, config: &Config) -> Result<(), ConfigError>;

    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;
}

pub type SharedConfigStore = Arc<dyn ConfigStore>;

fn validated(config: &Config) -> Result<(), ConfigError> {
    config
        .validate()
        .map_err(|e| ConfigError::ValidationFailed(format!("{e:#}")))
}
