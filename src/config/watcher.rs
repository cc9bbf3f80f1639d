//! Hot reload on config file change.
//!
//! The parent directory is watched rather than the file itself: editors and
//! config-management tools replace files by rename, which silently ends a
//! watch on the old inode.

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::store::{ConfigStore, FileConfigStore};
use super::Config;
use crate::bootstrap::{stopping, ShutdownState};
use crate::telemetry::counters;

/// Outcome of one burst of file changes
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// File parsed and validated
    Reloaded(Arc<Config>),

    /// File changed but could not be loaded; the previous config stays
    ReloadFailed(String),
}

/// Watches the config file and publishes every valid new version.
pub struct ConfigWatcher {
    store: FileConfigStore,
    file_name: OsString,
    watcher: RecommendedWatcher,
    changes: mpsc::Receiver<notify::Result<Event>>,
    current: watch::Sender<Arc<Config>>,
    /// Quiet period before reading (saves arrive as several events)
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(path: impl AsRef<Path>, initial: Arc<Config>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("config path has no file name: {}", path.display()))?;
        let format = super::Format::from_path(&path).unwrap_or(super::Format::Yaml);

        let (tx, changes) = mpsc::channel(64);
        let watcher = RecommendedWatcher::new(
            move |res| {
                // Dropped when the channel is full; a reload is already pending
                let _ = tx.try_send(res);
            },
            NotifyConfig::default(),
        )?;

        let (current, _) = watch::channel(initial);

        Ok(Self {
            store: FileConfigStore::with_format(path, format),
            file_name,
            watcher,
            changes,
            current,
            debounce: Duration::from_millis(500),
        })
    }

    /// Begin watching.
    pub fn start(&mut self) -> Result<()> {
        let dir = watch_dir(self.store.path());
        info!(path = %self.store.path().display(), dir = %dir.display(), "starting config watcher");
        self.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Receiver of every successfully loaded config.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.current.subscribe()
    }

    /// Last successfully loaded config.
    pub fn current(&self) -> Arc<Config> {
        self.current.borrow().clone()
    }

    /// Wait for the next change to the config file and load it.
    ///
    /// Returns `None` once the underlying watcher has gone away.
    pub async fn next_change(&mut self) -> Option<ConfigEvent> {
        loop {
            let event = self.changes.recv().await?;
            if self.concerns_file(event) {
                break;
            }
        }

        tokio::time::sleep(self.debounce).await;
        // Collapse the rest of the burst
        while self.changes.try_recv().is_ok() {}

        Some(self.reload().await)
    }

    async fn reload(&self) -> ConfigEvent {
        match self.store.load().await {
            Ok(config) => {
                let config = Arc::new(config);
                self.current.send_replace(config.clone());
                ConfigEvent::Reloaded(config)
            }
            Err(e) => {
                warn!(error = %e, "config file changed but could not be loaded, keeping current config");
                ConfigEvent::ReloadFailed(e.to_string())
            }
        }
    }

    fn concerns_file(&self, event: notify::Result<Event>) -> bool {
        match event {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_)
                ) && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(self.file_name.as_os_str()));
                if relevant {
                    debug!(kind = ?event.kind, "config file changed");
                }
                relevant
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
                false
            }
        }
    }

    /// Process changes until shutdown starts.
    pub async fn run(mut self, mut shutdown: watch::Receiver<ShutdownState>) {
        loop {
            tokio::select! {
                event = self.next_change() => match event {
                    Some(ConfigEvent::ReloadFailed(_)) => counters::config_reload_error("file_watch"),
                    Some(ConfigEvent::Reloaded(_)) => {}
                    None => {
                        warn!("file watcher closed, hot reload disabled");
                        stopping(&mut shutdown).await;
                        break;
                    }
                },
                _ = stopping(&mut shutdown) => break,
            }
        }
        info!("config watcher stopped");
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
