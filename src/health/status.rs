use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::provider::ProviderError;

/// Outcome of a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Answered faster than the fast threshold
    Healthy,
    /// Answered, but between the fast and slow thresholds
    Slow,
    /// Errored, timed out or answered slower than the slow threshold
    Unhealthy,
    /// Credential rejected
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Slow => "slow",
            Self::Unhealthy => "unhealthy",
            Self::Failed => "failed",
        }
    }

    /// Whether the provider may serve traffic.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Healthy | Self::Slow)
    }

    /// Whether the provider is down.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Unhealthy | Self::Failed)
    }

    /// Gauge value exported to Prometheus.
    pub fn code(&self) -> i64 {
        match self {
            Self::Healthy => 0,
            Self::Slow => 1,
            Self::Unhealthy => 2,
            Self::Failed => 3,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency thresholds used to classify a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub fast: Duration,
    pub slow: Duration,
}

impl Thresholds {
    /// Classify a probe result.
    pub fn classify(&self, result: &Result<(), ProviderError>, elapsed: Duration) -> HealthStatus {
        match result {
            Err(ProviderError::Auth(_)) => HealthStatus::Failed,
            Err(_) => HealthStatus::Unhealthy,
            Ok(()) if elapsed < self.fast => HealthStatus::Healthy,
            Ok(()) if elapsed < self.slow => HealthStatus::Slow,
            Ok(()) => HealthStatus::Unhealthy,
        }
    }
}

/// Latest probe result for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub provider: String,
    pub status: HealthStatus,
    /// Round-trip time of the deciding attempt
    #[serde(rename = "response_time_ms", serialize_with = "as_millis")]
    pub response_time: Option<Duration>,
    pub last_error: Option<String>,
    pub checked_at: DateTime<Utc>,
    /// Probe cycle that produced the record; 0 before the first probe
    #[serde(skip)]
    pub cycle: u64,
}

impl HealthRecord {
    /// Optimistic record used before the first probe.
    pub fn seeded(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            status: HealthStatus::Healthy,
            response_time: None,
            last_error: None,
            checked_at: Utc::now(),
            cycle: 0,
        }
    }

    pub fn new(
        provider: &str,
        status: HealthStatus,
        response_time: Duration,
        error: Option<&ProviderError>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            status,
            response_time: Some(response_time),
            last_error: error.map(ToString::to_string),
            checked_at: Utc::now(),
            cycle: 0,
        }
    }

    /// Same provider, different status. Used when state is carried across
    /// a reload.
    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }
}

fn as_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// A status change observed by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthTransition {
    pub provider: String,
    pub from: HealthStatus,
    pub to: HealthStatus,
}

impl HealthTransition {
    /// Compare consecutive records of one provider.
    pub fn between(previous: Option<&HealthRecord>, next: &HealthRecord) -> Option<Self> {
        let from = previous.map(|r| r.status).unwrap_or(HealthStatus::Healthy);
        (from != next.status).then(|| Self {
            provider: next.provider.clone(),
            from,
            to: next.status,
        })
    }

    /// Into unhealthy/failed from a serving state.
    pub fn is_failure(&self) -> bool {
        self.to.is_down() && !self.from.is_down()
    }

    /// From unhealthy/failed back to healthy.
    pub fn is_recovery(&self) -> bool {
        self.from.is_down() && self.to == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            fast: Duration::from_secs(1),
            slow: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_classify_latency() {
        let t = thresholds();
        assert_eq!(t.classify(&Ok(()), Duration::from_millis(200)), HealthStatus::Healthy);
        assert_eq!(t.classify(&Ok(()), Duration::from_secs(1)), HealthStatus::Slow);
        assert_eq!(t.classify(&Ok(()), Duration::from_millis(2999)), HealthStatus::Slow);
        assert_eq!(t.classify(&Ok(()), Duration::from_secs(3)), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_classify_errors() {
        let t = thresholds();
        let fast = Duration::from_millis(10);
        assert_eq!(
            t.classify(&Err(ProviderError::Auth("bad key".into())), fast),
            HealthStatus::Failed
        );
        assert_eq!(t.classify(&Err(ProviderError::api("502")), fast), HealthStatus::Unhealthy);
        assert_eq!(t.classify(&Err(ProviderError::Timeout), fast), HealthStatus::Unhealthy);
        assert_eq!(
            t.classify(&Err(ProviderError::Config("no zone".into())), fast),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_transitions() {
        let healthy = HealthRecord::seeded("a");
        let down = healthy.clone().with_status(HealthStatus::Unhealthy);
        let slow = healthy.clone().with_status(HealthStatus::Slow);

        assert_eq!(HealthTransition::between(Some(&healthy), &healthy), None);

        let t = HealthTransition::between(Some(&healthy), &down).unwrap();
        assert!(t.is_failure());
        assert!(!t.is_recovery());

        let t = HealthTransition::between(Some(&down), &healthy).unwrap();
        assert!(t.is_recovery());

        let t = HealthTransition::between(Some(&down), &slow).unwrap();
        assert!(!t.is_recovery());
        assert!(!t.is_failure());

        let failed = healthy.clone().with_status(HealthStatus::Failed);
        let t = HealthTransition::between(Some(&down), &failed).unwrap();
        assert!(!t.is_failure());
    }

    #[test]
    fn test_record_serializes_millis() {
        let record = HealthRecord::new(
            "a",
            HealthStatus::Slow,
            Duration::from_millis(1500),
            None,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["response_time_ms"], 1500);
        assert_eq!(json["status"], "slow");
    }
}
