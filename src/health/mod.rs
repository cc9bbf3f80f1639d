//! Provider health monitoring.
//!
//! Each probe is a minimal authenticated call classified by outcome and
//! latency into [`HealthStatus`]. The monitor reports records; the failover
//! controller decides what a status change means for routing.

mod monitor;
mod status;

pub use monitor::{HealthHistory, HealthMonitor};
pub use status::{HealthRecord, HealthStatus, HealthTransition, Thresholds};
