//! CDN provider adapters.
//!
//! Every back-end implements [`CdnProvider`]: credential validation (also the
//! health probe), URL rewriting, cache purge and statistics. Adapters are
//! self-contained; the only state they hold is their resolved configuration.
//!
//! Built-in adapters:
//! - [`BunnyCdn`] - bunny.net pull zones
//! - [`Cloudflare`] - Cloudflare zones (API token)
//! - [`MockProvider`] - in-process provider for tests and dry runs

mod bunny;
mod cloudflare;
mod credentials;
mod error;
pub mod http;
mod mock;
mod rewrite;

pub use bunny::BunnyCdn;
pub use cloudflare::Cloudflare;
pub use credentials::{CredentialResolver, EnvCredentialResolver, Secret, StaticCredentialResolver};
pub use error::ProviderError;
pub use mock::MockProvider;
pub use rewrite::UrlRewriter;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigError, ProviderConfig, ProviderKind};

/// Shared handle to a provider adapter.
pub type ProviderHandle = Arc<dyn CdnProvider>;

/// A provider-side zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub host: Option<String>,
}

/// Traffic statistics reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Requests served
    pub requests: u64,
    /// Bytes served
    pub bytes_served: u64,
    /// Cache hit ratio between 0.0 and 1.0
    pub cache_hit_ratio: f64,
}

/// Capability contract implemented by every CDN back-end.
#[async_trait]
pub trait CdnProvider: Send + Sync {
    /// Configured provider name.
    fn name(&self) -> &str;

    /// Back-end type.
    fn kind(&self) -> ProviderKind;

    /// Whether the provider is enabled.
    fn is_enabled(&self) -> bool;

    /// Host swapper for this provider.
    fn rewriter(&self) -> &UrlRewriter;

    /// Distribution host.
    fn cdn_host(&self) -> &str {
        self.rewriter().cdn_host()
    }

    /// Rewrite an origin URL onto this provider. Pure; disabled providers
    /// and foreign hosts return the input unchanged.
    fn rewrite_url(&self, original: &str) -> String {
        if !self.is_enabled() {
            return original.to_string();
        }
        self.rewriter().rewrite(original)
    }

    /// Minimal authenticated call. Doubles as the health probe.
    async fn validate_credentials(&self) -> Result<(), ProviderError>;

    /// Invalidate specific URLs.
    async fn purge_urls(&self, urls: &[String]) -> Result<(), ProviderError>;

    /// Invalidate everything cached for this site.
    async fn purge_all_cache(&self) -> Result<(), ProviderError>;

    /// List provider-side zones.
    async fn get_zones(&self) -> Result<Vec<Zone>, ProviderError>;

    /// Fetch traffic statistics.
    async fn get_statistics(&self) -> Result<ProviderStats, ProviderError>;
}

/// Creates adapters from provider configuration.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        config: &ProviderConfig,
        site_host: &str,
        client: &reqwest::Client,
    ) -> Result<ProviderHandle, ConfigError>;
}

/// Factory for the built-in adapters.
pub struct DefaultProviderFactory {
    resolver: Arc<dyn CredentialResolver>,
}

impl DefaultProviderFactory {
    pub fn new(resolver: Arc<dyn CredentialResolver>) -> Self {
        Self { resolver }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        site_host: &str,
        client: &reqwest::Client,
    ) -> Result<ProviderHandle, ConfigError> {
        from_config(config, site_host, self.resolver.as_ref(), client)
    }
}

/// Build an adapter from its configuration.
pub fn from_config(
    config: &ProviderConfig,
    site_host: &str,
    resolver: &dyn CredentialResolver,
    client: &reqwest::Client,
) -> Result<ProviderHandle, ConfigError> {
    let rewriter = UrlRewriter::new(site_host, &config.cdn_host);

    let provider: ProviderHandle = match config.kind {
        ProviderKind::Bunny => Arc::new(BunnyCdn::new(
            config,
            rewriter,
            resolver.resolve(config)?,
            client.clone(),
        )),
        ProviderKind::Cloudflare => {
            let zone = config.zone.clone().ok_or_else(|| ConfigError::ValidationFailed(
                format!("cloudflare provider '{}' requires a zone", config.name),
            ))?;
            Arc::new(Cloudflare::new(
                config,
                zone,
                rewriter,
                resolver.resolve(config)?,
                client.clone(),
            ))
        }
        ProviderKind::Mock => Arc::new(MockProvider::from_config(config, rewriter)),
    };

    debug!(
        provider = %config.name,
        kind = config.kind.name(),
        cdn_host = %config.cdn_host,
        enabled = config.enabled,
        "provider adapter created"
    );

    Ok(provider)
}
