use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from a file, format chosen by extension (YAML by default)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::parse(&contents, Format::from_path(path).unwrap_or(Format::Yaml))
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration in the given format
    pub fn parse(contents: &str, format: Format) -> Result<Self> {
        match format {
            Format::Yaml => Self::from_yaml(contents),
            Format::Json => Self::from_json(contents),
            Format::Toml => Self::from_toml(contents),
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).context("failed to parse JSON configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).context("failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Preference tables are not checked here: rules naming unknown providers
    /// are dropped with a warning when the router is built.
    pub fn validate(&self) -> Result<()> {
        if self.site.host.trim().is_empty() {
            anyhow::bail!("site.host must not be empty");
        }

        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be defined");
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                anyhow::bail!("provider name must not be empty");
            }
            if !names.insert(provider.name.as_str()) {
                anyhow::bail!("duplicate provider name: {}", provider.name);
            }
            if provider.priority == 0 {
                anyhow::bail!("provider '{}' priority must be at least 1", provider.name);
            }
            if provider.cdn_host.trim().is_empty() {
                anyhow::bail!("provider '{}' must define cdn_host", provider.name);
            }
        }

        let health = &self.health;
        if health.fast_threshold >= health.slow_threshold {
            anyhow::bail!(
                "health.fast_threshold ({:?}) must be below health.slow_threshold ({:?})",
                health.fast_threshold,
                health.slow_threshold
            );
        }
        if health.timeout.is_zero() {
            anyhow::bail!("health.timeout must be greater than zero");
        }
        if health.concurrency == 0 {
            anyhow::bail!("health.concurrency must be at least 1");
        }
        if health.retry.max_attempts == 0 {
            anyhow::bail!("health.retry.max_attempts must be at least 1");
        }

        info!(providers = self.providers.len(), "configuration validated successfully");
        Ok(())
    }

    /// Enabled providers in configuration order.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &super::ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadBalancer, MockMode, ProviderKind};
    use crate::router::ContentCategory;
    use std::time::Duration;

    #[test]
    fn test_minimal_config() {
        let yaml = r#"
site:
  host: www.example.com

providers:
  - name: bunny
    kind: bunny
    credential: "env:BUNNY_KEY"
    cdn_host: example.b-cdn.net
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, ProviderKind::Bunny);
        assert!(config.providers[0].enabled);
        assert_eq!(config.providers[0].priority, 1);
        assert_eq!(config.routing.load_balancer, LoadBalancer::WeightedRandom);
        assert_eq!(config.health.interval, Duration::from_secs(120));
        assert_eq!(config.failover.cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
site:
  host: www.example.com

providers:
  - name: primary
    kind: cloudflare
    priority: 1
    credential: "env:CF_TOKEN"
    zone: "023e105f4ecef8ad9ca31a8372d0c353"
    cdn_host: cdn.example.com
  - name: backup
    kind: mock
    priority: 2
    weight: 30
    cdn_host: backup.example.net
    mock:
      mode: api_error
      latency: 150ms

routing:
  load_balancer: round_robin
  geo_zones:
    - id: europe
      regions: [EU, GB]
      providers: [backup, primary]
  content_rules:
    - category: videos
      providers: [primary]

health:
  interval: 30s
  fast_threshold: 500ms
  slow_threshold: 2s

failover:
  cooldown: 1m
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.providers[1].weight, Some(30));
        let mock = config.providers[1].mock.as_ref().unwrap();
        assert_eq!(mock.mode, MockMode::ApiError);
        assert_eq!(mock.latency, Duration::from_millis(150));
        assert_eq!(config.routing.load_balancer, LoadBalancer::RoundRobin);
        assert_eq!(config.routing.geo_zones[0].regions, vec!["EU", "GB"]);
        assert_eq!(config.routing.content_rules[0].category, ContentCategory::Videos);
        assert_eq!(config.health.fast_threshold, Duration::from_millis(500));
        assert_eq!(config.failover.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_duplicate_provider() {
        let yaml = r#"
site:
  host: www.example.com
providers:
  - name: a
    kind: mock
    cdn_host: a.example.net
  - name: a
    kind: mock
    cdn_host: b.example.net
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.unwrap_err().to_string().contains("duplicate provider"));
    }

    #[test]
    fn test_no_providers() {
        let yaml = r#"
site:
  host: www.example.com
providers: []
"#;

        let result = Config::from_yaml(yaml);
        assert!(result.unwrap_err().to_string().contains("at least one provider"));
    }

    #[test]
    fn test_zero_priority_rejected() {
        let yaml = r#"
site:
  host: www.example.com
providers:
  - name: a
    kind: mock
    priority: 0
    cdn_host: a.example.net
"#;

        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let yaml = r#"
site:
  host: www.example.com
providers:
  - name: a
    kind: mock
    cdn_host: a.example.net
health:
  fast_threshold: 5s
  slow_threshold: 1s
"#;

        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("fast_threshold"));
    }

    #[test]
    fn test_json_and_toml() {
        let json = r#"{
            "site": {"host": "www.example.com"},
            "providers": [{"name": "a", "kind": "mock", "cdn_host": "a.example.net"}]
        }"#;
        assert_eq!(Config::from_json(json).unwrap().providers[0].name, "a");

        let toml = r#"
[site]
host = "www.example.com"

[[providers]]
name = "a"
kind = "mock"
cdn_host = "a.example.net"
"#;
        assert_eq!(Config::from_toml(toml).unwrap().providers[0].name, "a");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("a.yml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("a.JSON")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("a.toml")), Some(Format::Toml));
        assert_eq!(Format::from_path(Path::new("a.ini")), None);
    }
}
