use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, span, warn, Instrument, Level};

use crate::admin::{AdminServer, AdminState};
use crate::config::{
    loader::Format, Config, ConfigWatcher, FileConfigStore, SharedConfigStore,
};
use crate::orchestrator::Orchestrator;
use crate::provider::{DefaultProviderFactory, EnvCredentialResolver};
use crate::telemetry::{counters, Metrics};

use super::events::{Event, EventBus, LoggingObserver};
use super::scheduler::Scheduler;
use super::shutdown::{stopping, Shutdown, ShutdownState};

/// Main cdnd daemon
///
/// Components:
/// - Orchestrator: routing state, probes, failover
/// - Scheduler: health and recovery ticks
/// - Config watcher: hot reload on file change, SIGHUP or admin API
/// - Admin server: health, metrics, provider state and operator actions
/// - Shutdown: graceful drain bounded by `settings.shutdown_timeout`
pub struct Server {
    config: Arc<Config>,

    /// Config file path (for hot reload)
    config_path: PathBuf,

    shutdown: Arc<Shutdown>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        let shutdown = Shutdown::new(config.settings.shutdown_timeout);

        Self {
            config: Arc::new(config),
            config_path,
            shutdown,
        }
    }

    /// Run the daemon until SIGINT/SIGTERM
    pub async fn run(self) -> Result<()> {
        let span = span!(Level::INFO, "cdnd", version = env!("CARGO_PKG_VERSION"));

        async move {
            let metrics = Metrics::new()?;

            let events = EventBus::new(self.config.settings.event_capacity);
            events.register(Arc::new(LoggingObserver));
            events.publish(Event::Starting);

            let factory = Arc::new(DefaultProviderFactory::new(Arc::new(EnvCredentialResolver)));
            let orchestrator = Arc::new(
                Orchestrator::new((*self.config).clone(), factory, events.clone())
                    .context("failed to initialize orchestrator")?,
            );

            let store: SharedConfigStore = Arc::new(FileConfigStore::with_format(
                &self.config_path,
                Format::from_path(&self.config_path).unwrap_or(Format::Yaml),
            ));

            let mut tasks = Scheduler::new(orchestrator.clone()).spawn(self.shutdown.subscribe());

            if self.config.settings.hot_reload {
                tasks.extend(self.spawn_watcher(orchestrator.clone())?);
            }

            tasks.push(tokio::spawn(reload_on_sighup(
                orchestrator.clone(),
                store.clone(),
                self.shutdown.subscribe(),
            )));

            if self.config.admin.enabled {
                let state = Arc::new(AdminState::new(orchestrator.clone(), metrics, store));
                let admin = AdminServer::new(&self.config.admin, state, self.shutdown.clone());
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = admin.run().await {
                        error!(error = %e, "admin server failed");
                    }
                }));
            }

            info!(
                providers = self.config.providers.len(),
                geo_zones = self.config.routing.geo_zones.len(),
                content_rules = self.config.routing.content_rules.len(),
                load_balancer = ?self.config.routing.load_balancer,
                admin_address = %self.config.admin.address,
                admin = self.config.admin.enabled,
                hot_reload = self.config.settings.hot_reload,
                "cdnd started"
            );
            events.publish(Event::Ready);

            wait_for_shutdown().await;

            info!("shutdown signal received, starting graceful shutdown");
            events.publish(Event::ShutdownStarted);

            let abandoned = self.shutdown.drain(tasks).await;
            if abandoned > 0 {
                warn!(abandoned, "background tasks did not stop in time");
            }

            events.publish(Event::ShutdownComplete);
            info!("cdnd stopped");

            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Start the file watcher and the task feeding its reloads into the
    /// orchestrator.
    fn spawn_watcher(&self, orchestrator: Arc<Orchestrator>) -> Result<Vec<JoinHandle<()>>> {
        let mut watcher = ConfigWatcher::new(&self.config_path, self.config.clone())?;
        watcher.start()?;

        let mut changes = watcher.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        let apply = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let config = changes.borrow_and_update().clone();
                        if let Err(e) = orchestrator.reload((*config).clone()).await {
                            counters::config_reload_error("file_watch");
                            warn!(error = %e, "watched configuration rejected");
                        }
                    }
                    _ = stopping(&mut shutdown_rx) => break,
                }
            }
        });

        let watch_task = tokio::spawn(watcher.run(self.shutdown.subscribe()));

        Ok(vec![watch_task, apply])
    }

    pub fn shutdown(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }
}

/// Reload from the store on SIGHUP.
#[cfg(unix)]
async fn reload_on_sighup(
    orchestrator: Arc<Orchestrator>,
    store: SharedConfigStore,
    mut shutdown: watch::Receiver<ShutdownState>,
) {
    let mut hup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hup) => hup,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hup.recv() => {
                info!("received SIGHUP, reloading configuration");
                let result = match store.load().await {
                    Ok(config) => orchestrator.reload(config).await.map_err(anyhow::Error::from),
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    counters::config_reload_error("sighup");
                    warn!(error = %e, "configuration reload failed, keeping current config");
                }
            }
            _ = stopping(&mut shutdown) => break,
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_sighup(
    _orchestrator: Arc<Orchestrator>,
    _store: SharedConfigStore,
    mut shutdown: watch::Receiver<ShutdownState>,
) {
    stopping(&mut shutdown).await;
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}
