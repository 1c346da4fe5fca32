//! Watcher commands, statistics and the handle used to drive the watcher
//! thread from async code.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{ConfigError, WatcherError};
use crate::Result;

/// Statistics for file watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub batches: AtomicU64,
    pub paths_processed: AtomicU64,
    pub paths_skipped: AtomicU64,
    pub entries_upserted: AtomicU64,
    pub entries_removed: AtomicU64,
    pub reloads: AtomicU64,
    pub errors: AtomicU64,
    /// Gauge, not a counter.
    pub subscriptions: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            paths_processed: self.paths_processed.load(Ordering::Relaxed),
            paths_skipped: self.paths_skipped.load(Ordering::Relaxed),
            entries_upserted: self.entries_upserted.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStatsSnapshot {
    pub batches: u64,
    pub paths_processed: u64,
    pub paths_skipped: u64,
    pub entries_upserted: u64,
    pub entries_removed: u64,
    pub reloads: u64,
    pub errors: u64,
    pub subscriptions: u64,
}

/// What a reload or reindex did to each watched root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    /// Roots that were not configured before.
    pub added: Vec<PathBuf>,
    /// Roots dropped from the configuration.
    pub removed: Vec<PathBuf>,
    /// Roots whose watch settings changed, or every root on reindex.
    pub rescanned: Vec<PathBuf>,
    /// Roots left untouched.
    pub unchanged: Vec<PathBuf>,
    /// Roots that could not be watched.
    pub warnings: Vec<String>,
}

/// Requests handled on the watcher thread.
#[derive(Debug)]
pub enum WatcherCommand {
    /// Re-read the configuration file and reconcile watched roots.
    Reload(oneshot::Sender<std::result::Result<ReloadReport, ConfigError>>),
    /// Rebuild every root from scratch.
    Reindex(oneshot::Sender<ReloadReport>),
    /// Stop the watcher thread.
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the watcher thread.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    commands: Sender<WatcherCommand>,
    stats: Arc<WatcherStats>,
}

impl WatcherHandle {
    pub(crate) const fn new(commands: Sender<WatcherCommand>, stats: Arc<WatcherStats>) -> Self {
        Self { commands, stats }
    }

    /// Reload the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the new file is invalid (the previous
    /// configuration stays active), or an error if the watcher has stopped.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let report = self.request(WatcherCommand::Reload).await?;
        Ok(report?)
    }

    /// Rebuild the whole index.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher has stopped.
    pub async fn reindex(&self) -> Result<ReloadReport> {
        self.request(WatcherCommand::Reindex).await
    }

    /// Stop the watcher thread and wait for it to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher had already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(WatcherCommand::Shutdown).await
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.stats.snapshot()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> WatcherCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| WatcherError::Stopped)?;
        Ok(reply_rx.await.map_err(|_| WatcherError::Stopped)?)
    }
}
