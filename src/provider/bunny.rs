//! bunny.net adapter.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::http::{base_url, send, send_json};
use super::{CdnProvider, ProviderError, ProviderStats, Secret, UrlRewriter, Zone};
use crate::config::{ProviderConfig, ProviderKind};

/// Default bunny.net API endpoint.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.bunny.net";

/// bunny.net pull zone adapter.
///
/// Authenticates with the account `AccessKey` header. Zone-scoped calls
/// (purge all, statistics) need the pull zone id in `zone`.
pub struct BunnyCdn {
    name: String,
    enabled: bool,
    api: String,
    access_key: Secret,
    pull_zone: Option<String>,
    rewriter: UrlRewriter,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PullZone {
    id: u64,
    name: String,
    #[serde(default)]
    hostnames: Vec<Hostname>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Hostname {
    value: String,
}

/// `/pullzone` answers with a bare array or, when paginated, an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PullZoneList {
    Plain(Vec<PullZone>),
    Paged {
        #[serde(rename = "Items")]
        items: Vec<PullZone>,
    },
}

impl PullZoneList {
    fn into_items(self) -> Vec<PullZone> {
        match self {
            Self::Plain(items) | Self::Paged { items } => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Statistics {
    #[serde(default)]
    total_requests_served: u64,
    #[serde(default)]
    total_bandwidth_used: u64,
    /// Percent, 0-100
    #[serde(default)]
    cache_hit_rate: f64,
}

impl BunnyCdn {
    pub fn new(
        config: &ProviderConfig,
        rewriter: UrlRewriter,
        access_key: Secret,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: config.name.clone(),
            enabled: config.enabled,
            api: base_url(config.api_endpoint.as_deref(), DEFAULT_API_ENDPOINT),
            access_key,
            pull_zone: config.zone.clone(),
            rewriter,
            client,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.api, path))
            .header("AccessKey", self.access_key.expose())
            .header("Accept", "application/json")
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.api, path))
            .header("AccessKey", self.access_key.expose())
    }

    fn require_zone(&self) -> Result<&str, ProviderError> {
        self.pull_zone.as_deref().ok_or_else(|| {
            ProviderError::Config(format!("bunny provider '{}' has no pull zone id", self.name))
        })
    }
}

#[async_trait]
impl CdnProvider for BunnyCdn {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Bunny
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn rewriter(&self) -> &UrlRewriter {
        &self.rewriter
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        let request = match &self.pull_zone {
            Some(zone) => self.get(&format!("/pullzone/{zone}")),
            None => self
                .get("/pullzone")
                .query(&[("page", "1"), ("perPage", "1")]),
        };
        send(request).await.map(|_| ())
    }

    async fn purge_urls(&self, urls: &[String]) -> Result<(), ProviderError> {
        for url in urls {
            send(self.post("/purge").query(&[("url", url.as_str())])).await?;
            debug!(provider = %self.name, url = %url, "purged url");
        }
        Ok(())
    }

    async fn purge_all_cache(&self) -> Result<(), ProviderError> {
        let zone = self.require_zone()?;
        send(self.post(&format!("/pullzone/{zone}/purgeCache"))).await?;
        info!(provider = %self.name, zone = %zone, "purged pull zone cache");
        Ok(())
    }

    async fn get_zones(&self) -> Result<Vec<Zone>, ProviderError> {
        let zones: PullZoneList = send_json(self.get("/pullzone")).await?;
        Ok(zones
            .into_items()
            .into_iter()
            .map(|zone| Zone {
                id: zone.id.to_string(),
                name: zone.name,
                host: zone.hostnames.into_iter().next().map(|h| h.value),
            })
            .collect())
    }

    async fn get_statistics(&self) -> Result<ProviderStats, ProviderError> {
        let zone = self.require_zone()?;
        let stats: Statistics =
            send_json(self.get("/statistics").query(&[("pullZone", zone)])).await?;

        Ok(ProviderStats {
            requests: stats.total_requests_served,
            bytes_served: stats.total_bandwidth_used,
            cache_hit_ratio: (stats.cache_hit_rate / 100.0).clamp(0.0, 1.0),
        })
    }
}
