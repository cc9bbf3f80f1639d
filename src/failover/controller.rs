//! Per-provider failover state machine.
//!
//! States:
//! - Active: provider in rotation (no table entry)
//! - Failed: taken out of rotation until the cooldown elapses
//! - Recovering: cooldown elapsed, the next probe decides

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FailoverConfig;
use crate::health::{HealthRecord, HealthStatus};

use super::state::{FailoverPhase, FailoverState, FailoverTable};

/// State change produced by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// Provider taken (or kept) out of rotation with a fresh cooldown
    Failed {
        provider: String,
        reason: String,
        retry_count: u32,
    },
    /// Provider back in rotation
    Recovered { provider: String, downtime: Duration },
}

/// Failover controller.
///
/// Operates on a [`FailoverTable`] owned by the caller so table updates can
/// be published as one snapshot.
#[derive(Debug, Clone)]
pub struct FailoverController {
    cooldown: Duration,
}

impl FailoverController {
    pub fn new(config: &FailoverConfig) -> Self {
        Self {
            cooldown: config.cooldown,
        }
    }

    /// Feed one probe result into the state machine.
    pub fn observe(
        &self,
        table: &mut FailoverTable,
        record: &HealthRecord,
        now: Instant,
    ) -> Option<FailoverOutcome> {
        let provider = record.provider.as_str();

        let Some(state) = table.get_mut(provider) else {
            if !record.status.is_down() {
                return None;
            }
            let reason = reason_of(record);
            warn!(provider = %provider, reason = %reason, cooldown_secs = self.cooldown.as_secs(), "provider failed");
            let mut state = FailoverState::new(provider, reason.clone(), now, self.cooldown);
            state.credential_rejected = record.status == HealthStatus::Failed;
            table.insert(provider.to_string(), state);
            return Some(FailoverOutcome::Failed {
                provider: provider.to_string(),
                reason,
                retry_count: 1,
            });
        };

        if !state.cooldown_elapsed(now) {
            debug!(
                provider = %provider,
                status = %record.status,
                remaining_secs = state.cooldown_remaining(now).as_secs(),
                "provider in cooldown, probe ignored"
            );
            return None;
        }

        if record.status == HealthStatus::Healthy {
            let downtime = now.saturating_duration_since(state.down_since);
            let retry_count = state.retry_count;
            table.remove(provider);
            info!(
                provider = %provider,
                downtime_secs = downtime.as_secs(),
                retry_count,
                "provider recovered"
            );
            return Some(FailoverOutcome::Recovered {
                provider: provider.to_string(),
                downtime,
            });
        }

        let reason = reason_of(record);
        state.refail(reason.clone(), now, self.cooldown);
        state.credential_rejected = record.status == HealthStatus::Failed;
        warn!(
            provider = %provider,
            status = %record.status,
            retry_count = state.retry_count,
            "recovery probe failed, cooldown restarted"
        );
        Some(FailoverOutcome::Failed {
            provider: provider.to_string(),
            reason,
            retry_count: state.retry_count,
        })
    }

    /// Move providers whose cooldown elapsed into `recovering`. Returns
    /// their names. Providers with a rejected credential stay `failed`.
    pub fn advance(&self, table: &mut FailoverTable, now: Instant) -> Vec<String> {
        let mut advanced = Vec::new();
        for state in table.values_mut() {
            if state.state == FailoverPhase::Failed && state.awaiting_recovery(now) {
                state.state = FailoverPhase::Recovering;
                debug!(provider = %state.provider, "cooldown elapsed, awaiting recovery probe");
                advanced.push(state.provider.clone());
            }
        }
        advanced.sort();
        advanced
    }

    /// Providers whose cooldown has elapsed, except those whose credential
    /// was rejected.
    pub fn recovery_candidates(table: &FailoverTable, now: Instant) -> Vec<String> {
        let mut candidates: Vec<String> = table
            .values()
            .filter(|s| s.awaiting_recovery(now))
            .map(|s| s.provider.clone())
            .collect();
        candidates.sort();
        candidates
    }

    /// Phase of a provider.
    pub fn phase(table: &FailoverTable, provider: &str) -> FailoverPhase {
        table
            .get(provider)
            .map(|s| s.state)
            .unwrap_or(FailoverPhase::Active)
    }
}

fn reason_of(record: &HealthRecord) -> String {
    record
        .last_error
        .clone()
        .unwrap_or_else(|| match record.response_time {
            Some(t) => format!("probe reported {} after {}ms", record.status, t.as_millis()),
            None => format!("probe reported {}", record.status),
        })
}
