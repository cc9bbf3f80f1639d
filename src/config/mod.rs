mod error;
pub mod loader;
pub mod store;
mod types;
mod watcher;

pub use error::ConfigError;
pub use loader::Format;
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore, SharedConfigStore};
pub use types::*;
pub use watcher::{ConfigEvent, ConfigWatcher};
