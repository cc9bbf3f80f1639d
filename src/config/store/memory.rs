use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{validated, ConfigError, ConfigStore};
use crate::config::Config;

/// Configuration held in memory. Used by tests and embedders that build
/// configuration programmatically.
pub struct MemoryConfigStore {
    config: RwLock<Config>,
    revision: AtomicU64,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            revision: AtomicU64::new(0),
        }
    }

    /// Replace the stored configuration if it validates.
    pub fn update(&self, config: Config) -> Result<(), ConfigError> {
        validated(&config)?;
        *self.config.write() = config;
        self.revision.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn current(&self) -> Config {
        self.config.read().clone()
    }

    /// Number of accepted updates.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.current())
    }

    async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        self.update(config.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
