use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Failover phase of a provider.
///
/// `Active` providers have no entry in the failover table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    Active,
    Failed,
    Recovering,
}

impl FailoverPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Recovering => "recovering",
        }
    }
}

/// Failover bookkeeping for one provider out of rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailoverState {
    pub provider: String,
    pub state: FailoverPhase,
    /// Why the provider was last taken out of rotation
    pub reason: String,
    /// Failures observed since the provider was last active
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
    /// Taken out by a rejected credential; held until a reload
    pub credential_rejected: bool,
    /// Monotonic cooldown deadline
    #[serde(skip)]
    pub(crate) deadline: Instant,
    /// First failure of the current outage
    #[serde(skip)]
    pub(crate) down_since: Instant,
}

impl FailoverState {
    pub(crate) fn new(provider: &str, reason: String, now: Instant, cooldown: Duration) -> Self {
        let wall = Utc::now();
        Self {
            provider: provider.to_string(),
            state: FailoverPhase::Failed,
            reason,
            retry_count: 1,
            failed_at: wall,
            cooldown_until: wall + to_chrono(cooldown),
            credential_rejected: false,
            deadline: now + cooldown,
            down_since: now,
        }
    }

    /// Mark failed again with a fresh cooldown.
    pub(crate) fn refail(&mut self, reason: String, now: Instant, cooldown: Duration) {
        let wall = Utc::now();
        self.state = FailoverPhase::Failed;
        self.reason = reason;
        self.retry_count += 1;
        self.failed_at = wall;
        self.cooldown_until = wall + to_chrono(cooldown);
        self.deadline = now + cooldown;
    }

    /// Whether the next probe may decide recovery at `now`.
    pub fn awaiting_recovery(&self, now: Instant) -> bool {
        !self.credential_rejected && self.cooldown_elapsed(now)
    }

    /// New credentials were loaded; recovery may proceed again.
    pub(crate) fn clear_credential_rejection(&mut self) {
        self.credential_rejected = false;
    }

    /// Whether the cooldown has elapsed at `now`.
    pub fn cooldown_elapsed(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Time left in the cooldown.
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

/// Providers currently out of rotation, keyed by name.
pub type FailoverTable = HashMap<String, FailoverState>;

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}
