//! Admin HTTP server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bootstrap::{stopping, Shutdown};
use crate::config::{AdminConfig, SharedConfigStore};
use crate::orchestrator::Orchestrator;
use crate::telemetry::{counters, Metrics};

use super::handlers::{
    failover_handler, health_handler, live_handler, metrics_handler, provider_health_handler,
    purge_handler, ready_handler, reload_handler, route_handler, stats_handler, weights_handler,
};

/// Admin server state.
pub struct AdminState {
    /// Server start time
    start_time: Instant,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<Metrics>,
    /// Source for `/config/reload`
    store: SharedConfigStore,
    reload_count: AtomicU64,
}

impl AdminState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        metrics: Arc<Metrics>,
        store: SharedConfigStore,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            orchestrator,
            metrics,
            store,
            reload_count: AtomicU64::new(0),
        }
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get reload count.
    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::Relaxed)
    }

    /// Reload configuration from the store and apply it.
    ///
    /// The running configuration stays in place on any error.
    pub async fn reload_config(&self) -> Result<ReloadResult, String> {
        info!(store = self.store.name(), "reloading configuration via admin API");

        let config = self.store.load().await.map_err(|e| {
            counters::config_reload_error("admin");
            format!("failed to load config: {e}")
        })?;
        let providers = config.providers.len();

        let generation = self.orchestrator.reload(config).await.map_err(|e| {
            counters::config_reload_error("admin");
            warn!(error = %e, "configuration rejected");
            format!("failed to apply config: {e}")
        })?;

        let count = self.reload_count.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(ReloadResult {
            success: true,
            message: "Configuration reloaded successfully".to_string(),
            reload_count: count,
            generation: Some(generation),
            providers,
        })
    }
}

/// Result of a config reload operation.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadResult {
    pub success: bool,
    pub message: String,
    pub reload_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub providers: usize,
}

/// Admin HTTP server.
pub struct AdminServer {
    config: AdminConfig,
    state: Arc<AdminState>,
    shutdown: Arc<Shutdown>,
}

impl AdminServer {
    pub fn new(config: &AdminConfig, state: Arc<AdminState>, shutdown: Arc<Shutdown>) -> Self {
        Self {
            config: config.clone(),
            state,
            shutdown,
        }
    }

    /// Build the router.
    pub fn router(state: Arc<AdminState>) -> Router {
        Router::new()
            // Kubernetes-style health endpoints
            .route("/healthz", get(health_handler))
            .route("/livez", get(live_handler))
            .route("/readyz", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            // Provider state
            .route("/providers/health", get(provider_health_handler))
            .route("/providers/failover", get(failover_handler))
            .route("/providers/weights", get(weights_handler))
            .route("/providers/stats", get(stats_handler))
            // Operations
            .route("/route", get(route_handler))
            .route("/purge", post(purge_handler))
            .route("/config/reload", post(reload_handler))
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.address).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let router = Self::router(self.state.clone());
        let mut shutdown_rx = self.shutdown.subscribe();

        info!(address = %listener.local_addr()?, "starting admin server");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                stopping(&mut shutdown_rx).await;
                info!("admin server shutting down");
            })
            .await
    }
}
