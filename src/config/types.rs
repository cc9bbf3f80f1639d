use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::router::ContentCategory;

/// Root configuration for cdnd
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// The origin site whose asset URLs get rewritten
    pub site: SiteConfig,

    /// CDN back-ends
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Routing tables and load balancing
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Health probing
    #[serde(default)]
    pub health: HealthCheckConfig,

    /// Failover behaviour
    #[serde(default)]
    pub failover: FailoverConfig,

    /// Admin API configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// Origin site
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Host of the site's own asset URLs (e.g. `www.example.com`)
    pub host: String,
}

/// CDN provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider name
    pub name: String,

    /// Back-end type
    pub kind: ProviderKind,

    /// Disabled providers are never probed or selected
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Preference, lower = more preferred
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Explicit selection weight (overrides the priority-derived weight)
    #[serde(default)]
    pub weight: Option<u32>,

    /// Credential reference handed to the credential resolver
    #[serde(default)]
    pub credential: String,

    /// Base API endpoint (defaults per kind)
    #[serde(default)]
    pub api_endpoint: Option<String>,

    /// Distribution host that replaces the site host in rewritten URLs
    pub cdn_host: String,

    /// Provider-side zone or pull zone id
    #[serde(default)]
    pub zone: Option<String>,

    /// Behaviour of a mock provider
    #[serde(default)]
    pub mock: Option<MockConfig>,
}

/// Provider back-end type
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Bunny,
    Cloudflare,
    Mock,
}

impl ProviderKind {
    /// Get the string name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bunny => "bunny",
            Self::Cloudflare => "cloudflare",
            Self::Mock => "mock",
        }
    }
}

/// Mock provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MockConfig {
    /// Probe outcome
    #[serde(default)]
    pub mode: MockMode,

    /// Simulated latency
    #[serde(default, with = "humantime_serde")]
    pub latency: Duration,
}

/// Mock probe outcome
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    #[default]
    Ok,
    ApiError,
    AuthError,
    /// Never answers (exercises probe timeouts)
    Hang,
}

/// Routing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Load balancer used when no preference table matches
    #[serde(default)]
    pub load_balancer: LoadBalancer,

    /// Halve the weight of providers classified slow
    #[serde(default = "default_true")]
    pub latency_aware: bool,

    /// Region → preferred providers
    #[serde(default)]
    pub geo_zones: Vec<GeoZoneConfig>,

    /// Content category → preferred providers
    #[serde(default)]
    pub content_rules: Vec<ContentRuleConfig>,

    /// Publish a routing_decision event for every resolved request
    #[serde(default = "default_true")]
    pub emit_decisions: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            load_balancer: LoadBalancer::default(),
            latency_aware: true,
            geo_zones: Vec::new(),
            content_rules: Vec::new(),
            emit_decisions: true,
        }
    }
}

/// Load balancer type
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancer {
    #[default]
    WeightedRandom,
    RoundRobin,
    WeightedRoundRobin,
    Priority,
}

/// Geographic zone preference
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeoZoneConfig {
    /// Zone id
    pub id: String,

    /// Region codes served by this zone
    #[serde(default)]
    pub regions: Vec<String>,

    /// Preferred providers in order
    #[serde(default)]
    pub providers: Vec<String>,
}

/// Content category preference
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentRuleConfig {
    /// Content category
    pub category: ContentCategory,

    /// Preferred providers in order
    #[serde(default)]
    pub providers: Vec<String>,
}

/// Health check configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Probe cycle interval
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Hard timeout per probe attempt
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Responses faster than this are healthy
    #[serde(default = "default_fast_threshold", with = "humantime_serde")]
    pub fast_threshold: Duration,

    /// Responses slower than this are unhealthy
    #[serde(default = "default_slow_threshold", with = "humantime_serde")]
    pub slow_threshold: Duration,

    /// Maximum concurrent probes
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Records kept per provider for audit
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Retry of transient probe failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            timeout: default_health_timeout(),
            fast_threshold: default_fast_threshold(),
            slow_threshold: default_slow_threshold(),
            concurrency: default_concurrency(),
            history_size: default_history_size(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_health_interval() -> Duration {
    Duration::from_secs(120)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_fast_threshold() -> Duration {
    Duration::from_secs(1)
}

fn default_slow_threshold() -> Duration {
    Duration::from_secs(3)
}

fn default_concurrency() -> usize {
    8
}

fn default_history_size() -> usize {
    32
}

/// Bounded exponential backoff for transient probe failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound for a single delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(2)
}

/// Failover configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailoverConfig {
    /// Minimum time a failed provider stays out of rotation
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,

    /// Interval of the recovery check that probes only failed providers
    #[serde(default = "default_recovery_interval", with = "humantime_serde")]
    pub recovery_interval: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            recovery_interval: default_recovery_interval(),
        }
    }
}

fn default_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_recovery_interval() -> Duration {
    Duration::from_secs(30)
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Serve the admin API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API address
    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_admin_address(),
        }
    }
}

fn default_admin_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9190))
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Log level (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Global settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Reload when the config file changes
    #[serde(default = "default_true")]
    pub hot_reload: bool,

    /// Max time to wait for background tasks on shutdown
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Event bus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hot_reload: true,
            shutdown_timeout: default_shutdown_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_event_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u32 {
    1
}

/// Humantime serde support module
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
