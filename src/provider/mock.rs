//! In-process provider for tests and dry runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, trace};

use super::{CdnProvider, ProviderError, ProviderStats, UrlRewriter, Zone};
use crate::config::{MockMode, ProviderConfig, ProviderKind};

/// Mock CDN that answers without any network I/O.
///
/// Mode and latency can be changed at runtime so tests can drive a provider
/// through failure and recovery.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    enabled: bool,
    rewriter: UrlRewriter,
    behaviour: RwLock<(MockMode, Duration)>,
    /// Credential validations (probes) served
    probe_count: AtomicU64,
    /// Purge-all calls served
    purge_all_count: AtomicU64,
    /// URLs purged
    purged: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Create a mock from its provider configuration.
    pub fn from_config(config: &ProviderConfig, rewriter: UrlRewriter) -> Self {
        let mock = config.mock.clone().unwrap_or_default();
        Self::new(&config.name, rewriter, mock.mode, mock.latency).enabled(config.enabled)
    }

    /// Create a mock with the given behaviour.
    pub fn new(name: &str, rewriter: UrlRewriter, mode: MockMode, latency: Duration) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            rewriter,
            behaviour: RwLock::new((mode, latency)),
            probe_count: AtomicU64::new(0),
            purge_all_count: AtomicU64::new(0),
            purged: Mutex::new(Vec::new()),
        }
    }

    /// Set whether the provider is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Change the probe outcome.
    pub fn set_mode(&self, mode: MockMode) {
        self.behaviour.write().0 = mode;
    }

    /// Change the simulated latency.
    pub fn set_latency(&self, latency: Duration) {
        self.behaviour.write().1 = latency;
    }

    pub fn mode(&self) -> MockMode {
        self.behaviour.read().0
    }

    /// Number of credential validations served.
    pub fn probe_count(&self) -> u64 {
        self.probe_count.load(Ordering::Relaxed)
    }

    /// Number of purge-all calls served.
    pub fn purge_all_count(&self) -> u64 {
        self.purge_all_count.load(Ordering::Relaxed)
    }

    /// URLs purged so far.
    pub fn purged_urls(&self) -> Vec<String> {
        self.purged.lock().clone()
    }

    /// Simulate latency and produce the configured outcome.
    async fn respond(&self) -> Result<(), ProviderError> {
        let (mode, latency) = *self.behaviour.read();

        if !latency.is_zero() {
            trace!(provider = %self.name, latency_ms = latency.as_millis() as u64, "simulating latency");
            sleep(latency).await;
        }

        match mode {
            MockMode::Ok => Ok(()),
            MockMode::ApiError => {
                debug!(provider = %self.name, "mock api error");
                Err(ProviderError::Api {
                    status: Some(503),
                    message: "mock service unavailable".to_string(),
                })
            }
            MockMode::AuthError => {
                debug!(provider = %self.name, "mock auth error");
                Err(ProviderError::Auth("mock credential rejected".to_string()))
            }
            MockMode::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl CdnProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn rewriter(&self) -> &UrlRewriter {
        &self.rewriter
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        self.respond().await
    }

    async fn purge_urls(&self, urls: &[String]) -> Result<(), ProviderError> {
        self.respond().await?;
        self.purged.lock().extend(urls.iter().cloned());
        Ok(())
    }

    async fn purge_all_cache(&self) -> Result<(), ProviderError> {
        self.respond().await?;
        self.purge_all_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get_zones(&self) -> Result<Vec<Zone>, ProviderError> {
        self.respond().await?;
        Ok(vec![Zone {
            id: format!("mock-{}", self.name),
            name: self.name.clone(),
            host: Some(self.rewriter.cdn_host().to_string()),
        }])
    }

    async fn get_statistics(&self) -> Result<ProviderStats, ProviderError> {
        self.respond().await?;
        Ok(ProviderStats {
            requests: self.probe_count(),
            bytes_served: 0,
            cache_hit_ratio: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock(mode: MockMode) -> MockProvider {
        MockProvider::new(
            "mock",
            UrlRewriter::new("www.example.com", "mock.example.net"),
            mode,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_ok_mode() {
        let provider = mock(MockMode::Ok);
        provider.validate_credentials().await.unwrap();
        provider.validate_credentials().await.unwrap();
        assert_eq!(provider.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_error_modes() {
        let provider = mock(MockMode::ApiError);
        let err = provider.validate_credentials().await.unwrap_err();
        assert!(err.is_retryable());

        provider.set_mode(MockMode::AuthError);
        let err = provider.validate_credentials().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_never_completes() {
        let provider = mock(MockMode::Hang);
        let result =
            tokio::time::timeout(Duration::from_secs(5), provider.validate_credentials()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let provider = mock(MockMode::Ok);
        provider.set_latency(Duration::from_millis(1500));
        let start = tokio::time::Instant::now();
        provider.validate_credentials().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_purge_records_urls() {
        let provider = mock(MockMode::Ok);
        provider
            .purge_urls(&["https://mock.example.net/a.css".to_string()])
            .await
            .unwrap();
        provider.purge_all_cache().await.unwrap();

        assert_eq!(provider.purged_urls(), vec!["https://mock.example.net/a.css"]);
        assert_eq!(provider.purge_all_count(), 1);
    }
}
