use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{validated, ConfigError, ConfigStore};
use crate::config::{Config, Format};

/// Configuration file on disk, in YAML, JSON or TOML.
///
/// Changes to the file are picked up by [`crate::config::ConfigWatcher`];
/// this type only reads and writes it.
pub struct FileConfigStore {
    path: PathBuf,
    format: Format,
}

impl FileConfigStore {
    /// Store for `path`, with the format taken from its extension.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self, ConfigError> {
        let path = path.into();
        match Format::from_path(&path) {
            Some(format) => {
                debug!(path = %path.display(), ?format, "config file store");
                Ok(Self { path, format })
            }
            None => Err(ConfigError::LoadFailed(format!(
                "cannot tell config format from extension: {}",
                path.display()
            ))),
        }
    }

    pub fn with_format<P: Into<PathBuf>>(path: P, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn render(config: &Config, format: Format) -> Result<String, ConfigError> {
    let rendered = match format {
        Format::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
        Format::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
        Format::Toml => toml::to_string_pretty(config).map_err(|e| e.to_string()),
    };
    rendered.map_err(ConfigError::Serialization)
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Config, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let config = Config::parse(&raw, self.format).map_err(|e| {
            ConfigError::LoadFailed(format!("{}: {e:#}", self.path.display()))
        })?;

        info!(
            path = %self.path.display(),
            providers = config.providers.len(),
            geo_zones = config.routing.geo_zones.len(),
            content_rules = config.routing.content_rules.len(),
            "configuration read"
        );
        Ok(config)
    }

    async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        validated(config)?;
        let body = render(config, self.format)?;

        // Readers never see a half-written file
        let staging = self.staging_path();
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| ConfigError::SaveFailed(format!("{}: {e}", staging.display())))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| ConfigError::SaveFailed(format!("{}: {e}", self.path.display())))?;

        info!(path = %self.path.display(), "configuration written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
