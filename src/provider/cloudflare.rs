//! Cloudflare adapter (API token auth).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{base_url, send_json};
use super::{CdnProvider, ProviderError, ProviderStats, Secret, UrlRewriter, Zone};
use crate::config::{ProviderConfig, ProviderKind};

/// Default Cloudflare v4 API endpoint.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.cloudflare.com/client/v4";

/// Maximum files per purge_cache request.
pub const PURGE_BATCH_SIZE: usize = 30;

/// Cloudflare zone adapter.
pub struct Cloudflare {
    name: String,
    enabled: bool,
    api: String,
    zone_id: String,
    token: Secret,
    rewriter: UrlRewriter,
    client: reqwest::Client,
}

/// Standard v4 response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ZoneInfo {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PurgeRequest<'a> {
    Files { files: &'a [String] },
    Everything { purge_everything: bool },
}

#[derive(Debug, Default, Deserialize)]
struct Dashboard {
    #[serde(default)]
    totals: Totals,
}

#[derive(Debug, Default, Deserialize)]
struct Totals {
    #[serde(default)]
    requests: RequestTotals,
    #[serde(default)]
    bandwidth: BandwidthTotals,
}

#[derive(Debug, Default, Deserialize)]
struct RequestTotals {
    #[serde(default)]
    all: u64,
    #[serde(default)]
    cached: u64,
}

#[derive(Debug, Default, Deserialize)]
struct BandwidthTotals {
    #[serde(default)]
    all: u64,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>, ProviderError> {
        if self.success {
            return Ok(self.result);
        }
        let message = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ProviderError::api(if message.is_empty() {
            "request unsuccessful".to_string()
        } else {
            message
        }))
    }
}

impl Cloudflare {
    pub fn new(
        config: &ProviderConfig,
        zone_id: String,
        rewriter: UrlRewriter,
        token: Secret,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: config.name.clone(),
            enabled: config.enabled,
            api: base_url(config.api_endpoint.as_deref(), DEFAULT_API_ENDPOINT),
            zone_id,
            token,
            rewriter,
            client,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api, path))
            .bearer_auth(self.token.expose())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, ProviderError> {
        send_json::<Envelope<T>>(request).await?.into_result()
    }

    async fn purge(&self, body: &PurgeRequest<'_>) -> Result<(), ProviderError> {
        let path = format!("/zones/{}/purge_cache", self.zone_id);
        self.call::<serde_json::Value>(self.request(reqwest::Method::POST, &path).json(body))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl CdnProvider for Cloudflare {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloudflare
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn rewriter(&self) -> &UrlRewriter {
        &self.rewriter
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        let status: Option<TokenStatus> = self
            .call(self.request(reqwest::Method::GET, "/user/tokens/verify"))
            .await?;

        match status {
            Some(s) if s.status == "active" => Ok(()),
            Some(s) => Err(ProviderError::Auth(format!("token status is {}", s.status))),
            None => Err(ProviderError::api("token verification returned no result")),
        }
    }

    async fn purge_urls(&self, urls: &[String]) -> Result<(), ProviderError> {
        for batch in urls.chunks(PURGE_BATCH_SIZE) {
            self.purge(&PurgeRequest::Files { files: batch }).await?;
            debug!(provider = %self.name, count = batch.len(), "purged url batch");
        }
        Ok(())
    }

    async fn purge_all_cache(&self) -> Result<(), ProviderError> {
        self.purge(&PurgeRequest::Everything {
            purge_everything: true,
        })
        .await?;
        info!(provider = %self.name, zone = %self.zone_id, "purged zone cache");
        Ok(())
    }

    async fn get_zones(&self) -> Result<Vec<Zone>, ProviderError> {
        let zones: Option<Vec<ZoneInfo>> =
            self.call(self.request(reqwest::Method::GET, "/zones")).await?;

        Ok(zones
            .unwrap_or_default()
            .into_iter()
            .map(|z| Zone {
                host: Some(z.name.clone()),
                id: z.id,
                name: z.name,
            })
            .collect())
    }

    async fn get_statistics(&self) -> Result<ProviderStats, ProviderError> {
        let path = format!("/zones/{}/analytics/dashboard", self.zone_id);
        let dashboard: Dashboard = self
            .call(self.request(reqwest::Method::GET, &path))
            .await?
            .unwrap_or_default();

        let totals = dashboard.totals;
        let ratio = if totals.requests.all == 0 {
            0.0
        } else {
            totals.requests.cached as f64 / totals.requests.all as f64
        };

        Ok(ProviderStats {
            requests: totals.requests.all,
            bytes_served: totals.bandwidth.all,
            cache_hit_ratio: ratio.clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ZONE: &str = "023e105f4ecef8ad9ca31a8372d0c353";

    fn adapter(server: &MockServer) -> Cloudflare {
        let config = ProviderConfig {
            name: "cloudflare".to_string(),
            kind: ProviderKind::Cloudflare,
            enabled: true,
            priority: 1,
            weight: None,
            credential: String::new(),
            api_endpoint: Some(server.uri()),
            cdn_host: "cdn.example.com".to_string(),
            zone: Some(ZONE.to_string()),
            mock: None,
        };
        Cloudflare::new(
            &config,
            ZONE.to_string(),
            UrlRewriter::new("www.example.com", "cdn.example.com"),
            Secret::new("tok"),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_validate_active_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": {"id": "abc", "status": "active"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server).validate_credentials().await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_disabled_token_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": {"id": "abc", "status": "disabled"}
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).validate_credentials().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_forbidden_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = adapter(&server).validate_credentials().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/zones/{ZONE}/purge_cache")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{"code": 1012, "message": "Request must contain one of purge_everything or files"}],
                "result": null
            })))
            .mount(&server)
            .await;

        let err = adapter(&server).purge_all_cache().await.unwrap_err();
        match err {
            ProviderError::Api { message, .. } => assert!(message.contains("1012")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_purge_urls_in_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/zones/{ZONE}/purge_cache")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": {"id": ZONE}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let urls: Vec<String> = (0..65)
            .map(|i| format!("https://cdn.example.com/{i}.png"))
            .collect();
        adapter(&server).purge_urls(&urls).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_everything_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/zones/{ZONE}/purge_cache")))
            .and(body_json(json!({"purge_everything": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": {"id": ZONE}
            })))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server).purge_all_cache().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_zones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [],
                "result": [{"id": ZONE, "name": "example.com", "status": "active"}]
            })))
            .mount(&server)
            .await;

        let zones = adapter(&server).get_zones().await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, ZONE);
        assert_eq!(zones[0].host.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_get_statistics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/zones/{ZONE}/analytics/dashboard")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [],
                "result": {"totals": {
                    "requests": {"all": 400, "cached": 300},
                    "bandwidth": {"all": 123456}
                }}
            })))
            .mount(&server)
            .await;

        let stats = adapter(&server).get_statistics().await.unwrap();
        assert_eq!(stats.requests, 400);
        assert_eq!(stats.bytes_served, 123456);
        assert!((stats.cache_hit_ratio - 0.75).abs() < f64::EPSILON);
    }
}
