//! Probe execution for CDN providers.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace, warn};

use crate::config::{HealthCheckConfig, RetryConfig};
use crate::provider::{CdnProvider, ProviderError, ProviderHandle};
use crate::telemetry::counters;

use super::status::{HealthRecord, Thresholds};

/// Health monitor.
///
/// Probes providers via `validate_credentials` under a hard timeout and
/// classifies the result. Transient errors are retried with bounded
/// exponential backoff inside the probe. Fan-out is bounded by
/// `concurrency`, so one slow provider never delays the others.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    thresholds: Thresholds,
    timeout: Duration,
    concurrency: usize,
    retry: RetryConfig,
}

impl HealthMonitor {
    /// Create a new health monitor.
    pub fn new(config: &HealthCheckConfig) -> Self {
        Self {
            thresholds: Thresholds {
                fast: config.fast_threshold,
                slow: config.slow_threshold,
            },
            timeout: config.timeout,
            concurrency: config.concurrency.max(1),
            retry: config.retry.clone(),
        }
    }

    /// Probe one provider.
    pub async fn probe(&self, provider: &dyn CdnProvider) -> HealthRecord {
        let name = provider.name();
        let mut attempt = 1;

        loop {
            trace!(provider = %name, attempt, "probing provider");

            let started = Instant::now();
            let result = match timeout(self.timeout, provider.validate_credentials()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };
            let elapsed = started.elapsed();

            match result {
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        provider = %name,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "probe failed, retrying"
                    );
                    counters::health_probe_retry(name, err.kind());
                    sleep(delay).await;
                    attempt += 1;
                }
                result => {
                    let status = self.thresholds.classify(&result, elapsed);
                    let error = result.err();

                    if let Some(err) = &error {
                        warn!(provider = %name, status = %status, error = %err, "probe failed");
                    } else {
                        trace!(
                            provider = %name,
                            status = %status,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "probe completed"
                        );
                    }

                    counters::health_probe(name, status.as_str(), elapsed);
                    counters::provider_health_set(name, status.code());

                    return HealthRecord::new(name, status, elapsed, error.as_ref());
                }
            }
        }
    }

    /// Probe providers concurrently. Results come back in completion order.
    pub async fn probe_all(&self, providers: &[ProviderHandle]) -> Vec<HealthRecord> {
        let probes: Vec<BoxFuture<'static, HealthRecord>> = providers
            .iter()
            .map(|provider| {
                let monitor = self.clone();
                let provider = provider.clone();
                async move { monitor.probe(provider.as_ref()).await }.boxed()
            })
            .collect();

        stream::iter(probes)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry
            .base_delay
            .saturating_mul(factor)
            .min(self.retry.max_delay)
    }
}

/// Bounded per-provider ring buffer of recent probe records.
#[derive(Debug)]
pub struct HealthHistory {
    capacity: usize,
    records: Mutex<HashMap<String, VecDeque<HealthRecord>>>,
}

impl HealthHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Append a record, evicting the oldest when full.
    pub fn push(&self, record: &HealthRecord) {
        let mut records = self.records.lock();
        let ring = records
            .entry(record.provider.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(record.clone());
    }

    /// Records of one provider, oldest first.
    pub fn get(&self, provider: &str) -> Vec<HealthRecord> {
        self.records
            .lock()
            .get(provider)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget providers that are no longer configured.
    pub fn retain<F: Fn(&str) -> bool>(&self, keep: F) {
        self.records.lock().retain(|name, _| keep(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockMode;
    use crate::health::HealthStatus;
    use crate::provider::{MockProvider, UrlRewriter};
    use std::sync::Arc;

    fn config() -> HealthCheckConfig {
        HealthCheckConfig {
            timeout: Duration::from_secs(10),
            fast_threshold: Duration::from_secs(1),
            slow_threshold: Duration::from_secs(3),
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(2),
            },
            ..Default::default()
        }
    }

    fn mock(name: &str, mode: MockMode, latency: Duration) -> Arc<MockProvider> {
        Arc::new(MockProvider::new(
            name,
            UrlRewriter::new("www.example.com", &format!("{name}.example.net")),
            mode,
            latency,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_classification() {
        let monitor = HealthMonitor::new(&config());

        let fast = mock("fast", MockMode::Ok, Duration::from_millis(100));
        assert_eq!(monitor.probe(fast.as_ref()).await.status, HealthStatus::Healthy);

        let slow = mock("slow", MockMode::Ok, Duration::from_millis(1500));
        let record = monitor.probe(slow.as_ref()).await;
        assert_eq!(record.status, HealthStatus::Slow);
        assert!(record.response_time.unwrap() >= Duration::from_millis(1500));

        let sluggish = mock("sluggish", MockMode::Ok, Duration::from_secs(4));
        assert_eq!(monitor.probe(sluggish.as_ref()).await.status, HealthStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_not_retried() {
        let monitor = HealthMonitor::new(&config());
        let provider = mock("auth", MockMode::AuthError, Duration::ZERO);

        let record = monitor.probe(provider.as_ref()).await;
        assert_eq!(record.status, HealthStatus::Failed);
        assert!(record.last_error.is_some());
        assert_eq!(provider.probe_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_error_retried_up_to_max_attempts() {
        let monitor = HealthMonitor::new(&config());
        let provider = mock("flaky", MockMode::ApiError, Duration::ZERO);

        let started = Instant::now();
        let record = monitor.probe(provider.as_ref()).await;
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert_eq!(provider.probe_count(), 3);
        // 200ms + 400ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_times_out() {
        let mut cfg = config();
        cfg.retry.max_attempts = 1;
        let monitor = HealthMonitor::new(&cfg);
        let provider = mock("hang", MockMode::Hang, Duration::ZERO);

        let record = monitor.probe(provider.as_ref()).await;
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert_eq!(record.last_error.as_deref(), Some("operation timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_all_is_concurrent() {
        let mut cfg = config();
        cfg.retry.max_attempts = 1;
        let monitor = HealthMonitor::new(&cfg);

        let providers: Vec<ProviderHandle> = vec![
            mock("hang", MockMode::Hang, Duration::ZERO),
            mock("a", MockMode::Ok, Duration::from_millis(50)),
            mock("b", MockMode::Ok, Duration::from_millis(50)),
        ];

        let started = Instant::now();
        let records = monitor.probe_all(&providers).await;
        assert_eq!(records.len(), 3);
        // Bounded by the single timeout, not the sum
        assert!(started.elapsed() < Duration::from_secs(11));

        let by_name: HashMap<_, _> = records.iter().map(|r| (r.provider.as_str(), r.status)).collect();
        assert_eq!(by_name["a"], HealthStatus::Healthy);
        assert_eq!(by_name["b"], HealthStatus::Healthy);
        assert_eq!(by_name["hang"], HealthStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_all_on_spawned_task() {
        let monitor = HealthMonitor::new(&config());
        let providers: Vec<ProviderHandle> = vec![
            mock("a", MockMode::Ok, Duration::from_millis(10)),
            mock("b", MockMode::AuthError, Duration::ZERO),
        ];

        let records = tokio::spawn(async move { monitor.probe_all(&providers).await })
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        let monitor = HealthMonitor::new(&config());
        assert_eq!(monitor.backoff(1), Duration::from_millis(200));
        assert_eq!(monitor.backoff(2), Duration::from_millis(400));
        assert_eq!(monitor.backoff(10), Duration::from_secs(2));
    }

    #[test]
    fn test_history_ring() {
        let history = HealthHistory::new(3);
        for status in [
            HealthStatus::Healthy,
            HealthStatus::Slow,
            HealthStatus::Unhealthy,
            HealthStatus::Unhealthy,
        ] {
            history.push(&HealthRecord::seeded("a").with_status(status));
        }

        let records = history.get("a");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].status, HealthStatus::Slow);
        assert_eq!(records[2].status, HealthStatus::Unhealthy);

        history.retain(|name| name != "a");
        assert!(history.get("a").is_empty());
    }
}
