use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing::info;

/// Prometheus registry holding the process counters.
pub struct Metrics {
    registry: Registry,
}

impl Metrics {
    /// Create a registry and register every counter in it.
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();
        counters::init(&registry)?;

        info!("prometheus metrics registered");

        Ok(Arc::new(Self { registry }))
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

/// Process-wide counters.
///
/// Collectors live in statics so any component can record without holding a
/// handle. Recording before [`init`] is a no-op.
pub mod counters {
    use prometheus::core::Collector;
    use prometheus::{
        HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    };
    use std::sync::OnceLock;
    use std::time::Duration;

    // ============================================================================
    // HEALTH METRICS
    // ============================================================================

    static HEALTH_PROBES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static HEALTH_PROBE_DURATION: OnceLock<HistogramVec> = OnceLock::new();
    static HEALTH_PROBE_RETRIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static PROVIDER_HEALTH_STATUS: OnceLock<IntGaugeVec> = OnceLock::new();

    // ============================================================================
    // FAILOVER / ROUTING METRICS
    // ============================================================================

    static FAILOVERS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static RECOVERIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static ELIGIBLE_PROVIDERS: OnceLock<IntGauge> = OnceLock::new();
    static PROVIDER_WEIGHT: OnceLock<IntGaugeVec> = OnceLock::new();
    static ROUTING_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static ROUTING_RULES_IGNORED: OnceLock<IntGauge> = OnceLock::new();
    static PROVIDERS_SKIPPED: OnceLock<IntGauge> = OnceLock::new();

    // ============================================================================
    // OPERATOR / SYSTEM METRICS
    // ============================================================================

    static PURGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static CONFIG_RELOADS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static CONFIG_RELOAD_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
    static BUILD_INFO: OnceLock<IntGaugeVec> = OnceLock::new();

    /// Create the collectors (once per process) and register them.
    pub fn init(registry: &Registry) -> prometheus::Result<()> {
        register(
            registry,
            &HEALTH_PROBES_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_health_probes_total", "Health probes by provider and resulting status"),
                &["provider", "status"],
            ),
        )?;
        register(
            registry,
            &HEALTH_PROBE_DURATION,
            HistogramVec::new(
                HistogramOpts::new("cdnd_health_probe_duration_seconds", "Probe round-trip time")
                    .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0]),
                &["provider"],
            ),
        )?;
        register(
            registry,
            &HEALTH_PROBE_RETRIES_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_health_probe_retries_total", "Probe retries after transient errors"),
                &["provider", "error"],
            ),
        )?;
        register(
            registry,
            &PROVIDER_HEALTH_STATUS,
            IntGaugeVec::new(
                Opts::new(
                    "cdnd_provider_health_status",
                    "Provider status (0 healthy, 1 slow, 2 unhealthy, 3 failed)",
                ),
                &["provider"],
            ),
        )?;
        register(
            registry,
            &FAILOVERS_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_failovers_total", "Providers taken out of rotation"),
                &["provider"],
            ),
        )?;
        register(
            registry,
            &RECOVERIES_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_recoveries_total", "Providers returned to rotation"),
                &["provider"],
            ),
        )?;
        register(
            registry,
            &ELIGIBLE_PROVIDERS,
            IntGauge::new("cdnd_eligible_providers", "Providers currently eligible for traffic"),
        )?;
        register(
            registry,
            &PROVIDER_WEIGHT,
            IntGaugeVec::new(
                Opts::new("cdnd_provider_weight", "Normalized selection weight (percent)"),
                &["provider"],
            ),
        )?;
        register(
            registry,
            &ROUTING_DECISIONS_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_routing_decisions_total", "Routing decisions by reason"),
                &["reason"],
            ),
        )?;
        register(
            registry,
            &ROUTING_RULES_IGNORED,
            IntGauge::new("cdnd_routing_rules_ignored", "Malformed routing rules in the active config"),
        )?;
        register(
            registry,
            &PROVIDERS_SKIPPED,
            IntGauge::new(
                "cdnd_providers_skipped",
                "Enabled providers whose adapter could not be built",
            ),
        )?;
        register(
            registry,
            &PURGES_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_purges_total", "Cache purges by provider, scope and result"),
                &["provider", "scope", "result"],
            ),
        )?;
        register(
            registry,
            &CONFIG_RELOADS_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_config_reloads_total", "Configuration reloads"),
                &["result"],
            ),
        )?;
        register(
            registry,
            &CONFIG_RELOAD_ERRORS_TOTAL,
            IntCounterVec::new(
                Opts::new("cdnd_config_reload_errors_total", "Configuration reload errors by source"),
                &["source"],
            ),
        )?;
        register(
            registry,
            &BUILD_INFO,
            IntGaugeVec::new(Opts::new("cdnd_build_info", "Build information"), &["version"]),
        )?;

        if let Some(g) = BUILD_INFO.get() {
            g.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1);
        }

        Ok(())
    }

    fn register<T>(
        registry: &Registry,
        cell: &OnceLock<T>,
        create: prometheus::Result<T>,
    ) -> prometheus::Result<()>
    where
        T: Collector + Clone + 'static,
    {
        let collector = match cell.get() {
            Some(existing) => existing.clone(),
            None => {
                let created = create?;
                cell.get_or_init(|| created).clone()
            }
        };
        registry.register(Box::new(collector))
    }

    // ============================================================================
    // HEALTH RECORDING FUNCTIONS
    // ============================================================================

    pub fn health_probe(provider: &str, status: &str, elapsed: Duration) {
        if let Some(c) = HEALTH_PROBES_TOTAL.get() {
            c.with_label_values(&[provider, status]).inc();
        }
        if let Some(h) = HEALTH_PROBE_DURATION.get() {
            h.with_label_values(&[provider]).observe(elapsed.as_secs_f64());
        }
    }

    pub fn health_probe_retry(provider: &str, error: &str) {
        if let Some(c) = HEALTH_PROBE_RETRIES_TOTAL.get() {
            c.with_label_values(&[provider, error]).inc();
        }
    }

    pub fn provider_health_set(provider: &str, code: i64) {
        if let Some(g) = PROVIDER_HEALTH_STATUS.get() {
            g.with_label_values(&[provider]).set(code);
        }
    }

    // ============================================================================
    // FAILOVER / ROUTING RECORDING FUNCTIONS
    // ============================================================================

    pub fn failover(provider: &str) {
        if let Some(c) = FAILOVERS_TOTAL.get() {
            c.with_label_values(&[provider]).inc();
        }
    }

    pub fn recovery(provider: &str) {
        if let Some(c) = RECOVERIES_TOTAL.get() {
            c.with_label_values(&[provider]).inc();
        }
    }

    pub fn eligible_providers_set(count: usize) {
        if let Some(g) = ELIGIBLE_PROVIDERS.get() {
            g.set(count as i64);
        }
    }

    pub fn provider_weight_set(provider: &str, weight: u32) {
        if let Some(g) = PROVIDER_WEIGHT.get() {
            g.with_label_values(&[provider]).set(i64::from(weight));
        }
    }

    pub fn routing_decision(reason: &str) {
        if let Some(c) = ROUTING_DECISIONS_TOTAL.get() {
            c.with_label_values(&[reason]).inc();
        }
    }

    pub fn routing_rules_ignored_set(count: usize) {
        if let Some(g) = ROUTING_RULES_IGNORED.get() {
            g.set(count as i64);
        }
    }

    pub fn providers_skipped_set(count: usize) {
        if let Some(g) = PROVIDERS_SKIPPED.get() {
            g.set(count as i64);
        }
    }

    // ============================================================================
    // OPERATOR / SYSTEM RECORDING FUNCTIONS
    // ============================================================================

    pub fn purge(provider: &str, scope: &str, success: bool) {
        if let Some(c) = PURGES_TOTAL.get() {
            c.with_label_values(&[provider, scope, if success { "success" } else { "failure" }])
                .inc();
        }
    }

    pub fn config_reloaded() {
        if let Some(c) = CONFIG_RELOADS_TOTAL.get() {
            c.with_label_values(&["success"]).inc();
        }
    }

    pub fn config_reload_error(source: &str) {
        if let Some(c) = CONFIG_RELOADS_TOTAL.get() {
            c.with_label_values(&["failure"]).inc();
        }
        if let Some(c) = CONFIG_RELOAD_ERRORS_TOTAL.get() {
            c.with_label_values(&[source]).inc();
        }
    }
}
