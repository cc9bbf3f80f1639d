use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shutdown state machine
///
/// States:
/// 1. Running - background loops tick normally
/// 2. Draining - loops finish their current cycle and exit
/// 3. Terminated - every task has stopped or was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Terminated,
}

/// Coordinates graceful shutdown of background tasks
pub struct Shutdown {
    state: watch::Sender<ShutdownState>,

    /// How long draining tasks get before they are abandoned
    drain_period: Duration,
}

impl Shutdown {
    pub fn new(drain_period: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ShutdownState::Running);
        Arc::new(Self {
            state,
            drain_period,
        })
    }

    /// Get current state
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    pub fn drain_period(&self) -> Duration {
        self.drain_period
    }

    /// Start draining (called on SIGTERM/SIGINT)
    pub fn start_drain(&self) {
        if self.state() != ShutdownState::Running {
            return;
        }

        info!(
            drain_period_secs = self.drain_period.as_secs(),
            "starting graceful shutdown drain"
        );

        self.state.send_replace(ShutdownState::Draining);
    }

    /// Wait for the given tasks, up to the drain period, then terminate.
    ///
    /// Returns the number of tasks that had to be aborted.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>) -> usize {
        self.start_drain();

        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let finished = tokio::time::timeout(self.drain_period, futures::future::join_all(tasks)).await;

        let abandoned = match finished {
            Ok(_) => 0,
            Err(_) => {
                let pending = aborts.iter().filter(|h| !h.is_finished()).count();
                warn!(pending, "drain timeout reached, aborting remaining tasks");
                for handle in &aborts {
                    handle.abort();
                }
                pending
            }
        };

        self.terminate();
        abandoned
    }

    /// Complete shutdown
    pub fn terminate(&self) {
        if self.state() == ShutdownState::Terminated {
            return;
        }

        info!("shutdown complete");
        self.state.send_replace(ShutdownState::Terminated);
    }
}

/// Resolves once the state leaves `Running`.
pub async fn stopping(rx: &mut watch::Receiver<ShutdownState>) {
    while *rx.borrow_and_update() == ShutdownState::Running {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
