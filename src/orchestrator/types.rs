use serde::{Deserialize, Serialize};

use crate::health::HealthTransition;
use crate::provider::ProviderStats;

/// What to invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurgeScope {
    Urls(Vec<String>),
    All,
}

impl PurgeScope {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Urls(_) => "urls",
            Self::All => "all",
        }
    }
}

/// Result of a successful purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub provider: String,
    pub scope: &'static str,
    /// URLs invalidated (0 for a full purge)
    pub urls: usize,
}

/// Statistics of one provider, or the error fetching them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatistics {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProviderStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one probe cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub probed: usize,
    /// Results dropped because a later cycle already reported
    pub superseded: usize,
    pub transitions: Vec<HealthTransition>,
    pub failed: Vec<String>,
    pub recovered: Vec<String>,
}
