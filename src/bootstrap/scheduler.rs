//! Background ticks driving the orchestrator.
//!
//! Two independent loops: the health cycle probes every provider, the
//! recovery check probes only providers whose cooldown has elapsed.
//! Intervals are re-read from the active configuration after every tick so
//! a reload takes effect without restarting the loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::orchestrator::Orchestrator;

use super::shutdown::{stopping, ShutdownState};

/// Spawns and owns the background loops.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Spawn both loops. They exit once `shutdown` leaves `Running`.
    pub fn spawn(&self, shutdown: watch::Receiver<ShutdownState>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(health_loop(self.orchestrator.clone(), shutdown.clone())),
            tokio::spawn(recovery_loop(self.orchestrator.clone(), shutdown)),
        ]
    }
}

/// Runs a cycle immediately, then every `health.interval`.
async fn health_loop(orchestrator: Arc<Orchestrator>, mut shutdown: watch::Receiver<ShutdownState>) {
    info!("health loop started");
    loop {
        let report = tokio::select! {
            report = orchestrator.run_health_cycle() => report,
            _ = stopping(&mut shutdown) => break,
        };
        debug!(
            probed = report.probed,
            transitions = report.transitions.len(),
            "health cycle complete"
        );

        let interval = orchestrator.config().health.interval;
        if !pause(interval, &mut shutdown).await {
            break;
        }
    }
    info!("health loop stopped");
}

/// Runs every `failover.recovery_interval`, starting one interval in.
async fn recovery_loop(
    orchestrator: Arc<Orchestrator>,
    mut shutdown: watch::Receiver<ShutdownState>,
) {
    info!("recovery loop started");
    loop {
        let interval = orchestrator.config().failover.recovery_interval;
        if !pause(interval, &mut shutdown).await {
            break;
        }

        let report = tokio::select! {
            report = orchestrator.run_recovery_check() => report,
            _ = stopping(&mut shutdown) => break,
        };
        if report.probed > 0 {
            debug!(
                probed = report.probed,
                recovered = report.recovered.len(),
                "recovery check complete"
            );
        }
    }
    info!("recovery loop stopped");
}

/// Sleep for `period`; false when shutdown started first.
async fn pause(period: Duration, shutdown: &mut watch::Receiver<ShutdownState>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => true,
        _ = stopping(shutdown) => false,
    }
}
