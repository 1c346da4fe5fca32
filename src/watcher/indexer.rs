//! Incremental indexing service.
//!
//! The indexer owns the [`FileWatcher`] and runs on a dedicated thread.
//! Event batches and commands are handled one at a time, so a reload never
//! interleaves with event processing.

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver};

use super::events::EventBatch;
use super::handler::{ReloadReport, WatcherCommand, WatcherHandle, WatcherStats};
use super::scanner::scan_tree;
use super::watcher::FileWatcher;
use crate::config::{Config, ConfigStore, WatchedDirectory};
use crate::error::{ConfigError, WatcherError};
use crate::storage::{IndexEntry, IndexStore};

/// Keeps the index in step with the filesystem.
pub struct Indexer {
    config_store: Arc<ConfigStore>,
    config: Arc<Config>,
    index: IndexStore,
    watcher: FileWatcher,
    stats: Arc<WatcherStats>,
}

impl Indexer {
    /// Create an indexer for the store's active configuration.
    ///
    /// Nothing is scanned until [`Indexer::start`] is called.
    #[must_use]
    pub fn new(
        config_store: Arc<ConfigStore>,
        index: IndexStore,
        watcher: FileWatcher,
        stats: Arc<WatcherStats>,
    ) -> Self {
        let config = config_store.active();
        Self {
            config_store,
            config,
            index,
            watcher,
            stats,
        }
    }

    /// Index and subscribe every configured root.
    ///
    /// Roots that cannot be watched are skipped and returned as warnings.
    pub fn start(&mut self) -> Vec<String> {
        let config = Arc::clone(&self.config);
        let mut warnings = Vec::new();

        for root in &config.directories {
            if let Err(e) = self.index_root(root) {
                warnings.push(e.to_string());
            }
        }

        self.sync_gauges();
        tracing::info!(
            roots = config.directories.len(),
            entries = self.index.len(),
            subscriptions = self.watcher.subscription_count(),
            "Initial index built"
        );
        warnings
    }

    /// Apply one debounced batch.
    pub fn apply_batch(&mut self, batch: EventBatch) {
        WatcherStats::add(&self.stats.batches, 1);
        tracing::debug!(paths = batch.len(), "Processing event batch");

        for path in batch {
            self.apply_path(&path);
        }
        self.sync_gauges();
    }

    /// Bring the index in line with the current state of `path`.
    ///
    /// Event kinds are not trusted: the path is checked on disk, which makes
    /// create, delete and both halves of a rename the same operation.
    pub fn apply_path(&mut self, path: &Path) {
        WatcherStats::add(&self.stats.paths_processed, 1);

        let config = Arc::clone(&self.config);
        let Some(root) = config.root_for(path) else {
            tracing::trace!(path = %path.display(), "Event outside watched directories");
            WatcherStats::add(&self.stats.paths_skipped, 1);
            return;
        };

        if path == root.path {
            if !fs::symlink_metadata(path).is_ok_and(|m| m.is_dir()) {
                tracing::warn!(path = %path.display(), "Watched directory disappeared");
                self.forget(path);
            }
            return;
        }

        // Below the watched depth, or under an ignored directory.
        let watched_parent = path.parent().is_some_and(|p| self.watcher.is_subscribed(p));
        if !watched_parent {
            WatcherStats::add(&self.stats.paths_skipped, 1);
            return;
        }

        let Ok(metadata) = fs::symlink_metadata(path) else {
            self.forget(path);
            return;
        };
        let is_dir = metadata.is_dir();

        if root.matcher().matches(path, is_dir) {
            self.forget(path);
            return;
        }

        let entry = IndexEntry::from_metadata(path, &metadata);

        if is_dir && root.recurse {
            // A directory recreated under the same name lost its kernel
            // watches with the old inode; its own event is the only trace.
            let released = self.watcher.unsubscribe_prefix(path);
            if released > 0 {
                tracing::debug!(path = %path.display(), released, "Refreshing watched directory");
            }
            self.index_subtree(root, entry);
        } else if self.index.get(path).is_some_and(|old| old.is_directory && !is_dir) {
            self.watcher.unsubscribe_prefix(path);
            let (removed, _) = self.index.replace_prefix(path, [entry]);
            WatcherStats::add(&self.stats.entries_removed, removed);
            WatcherStats::add(&self.stats.entries_upserted, 1);
        } else if self.index.upsert(entry) {
            WatcherStats::add(&self.stats.entries_upserted, 1);
        }
    }

    /// Drop `path`, everything below it and their subscriptions.
    pub fn forget(&mut self, path: &Path) -> usize {
        self.watcher.unsubscribe_prefix(path);
        let removed = self.index.remove_prefix(path);
        if removed > 0 {
            tracing::debug!(path = %path.display(), removed, "Removed from index");
            WatcherStats::add(&self.stats.entries_removed, removed);
        }
        removed
    }

    /// Re-read the configuration and reconcile roots with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the new configuration is invalid. Nothing changes
    /// in that case.
    pub fn reload(&mut self) -> Result<ReloadReport, ConfigError> {
        let next = Arc::new(self.config_store.load()?);
        let previous = self.config_store.replace(Arc::clone(&next));
        self.config = Arc::clone(&next);
        WatcherStats::add(&self.stats.reloads, 1);

        let mut report = ReloadReport::default();

        for old in &previous.directories {
            if !next.directories.iter().any(|d| d.path == old.path) {
                self.forget(&old.path);
                report.removed.push(old.path.clone());
            }
        }

        for root in &next.directories {
            let bucket = match previous.directories.iter().find(|d| d.path == root.path) {
                Some(old) if old.same_watch(root) && self.watcher.is_subscribed(&root.path) => {
                    report.unchanged.push(root.path.clone());
                    continue;
                }
                Some(_) => &mut report.rescanned,
                None => &mut report.added,
            };
            bucket.push(root.path.clone());

            if let Err(e) = self.index_root(root) {
                report.warnings.push(e.to_string());
            }
        }

        self.sync_gauges();
        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            rescanned = report.rescanned.len(),
            unchanged = report.unchanged.len(),
            warnings = report.warnings.len(),
            "Configuration reloaded"
        );
        Ok(report)
    }

    /// Rebuild every root from the filesystem.
    pub fn reindex(&mut self) -> ReloadReport {
        let config = Arc::clone(&self.config);
        let mut report = ReloadReport::default();

        for root in &config.directories {
            report.rescanned.push(root.path.clone());
            if let Err(e) = self.index_root(root) {
                report.warnings.push(e.to_string());
            }
        }

        self.sync_gauges();
        tracing::info!(roots = report.rescanned.len(), entries = self.index.len(), "Index rebuilt");
        report
    }

    /// Handle events and commands until shutdown.
    pub fn run(mut self, commands: &Receiver<WatcherCommand>) {
        let events = self.watcher.events().clone();

        loop {
            select! {
                recv(events) -> batch => match batch {
                    Ok(batch) => self.apply_batch(batch),
                    Err(_) => {
                        tracing::error!("Event channel closed");
                        break;
                    }
                },
                recv(commands) -> command => match command {
                    Ok(WatcherCommand::Reload(reply)) => {
                        let result = self.reload();
                        if let Err(e) = &result {
                            tracing::warn!(
                                source = %self.config_store.source().display(),
                                error = %e,
                                "Reload rejected, keeping previous configuration"
                            );
                        }
                        let _ = reply.send(result);
                    }
                    Ok(WatcherCommand::Reindex(reply)) => {
                        let _ = reply.send(self.reindex());
                    }
                    Ok(WatcherCommand::Shutdown(reply)) => {
                        let _ = reply.send(());
                        break;
                    }
                    Err(_) => break,
                },
            }
        }

        tracing::info!("Watcher stopped");
    }

    /// Live subscription count.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.watcher.subscription_count()
    }

    fn index_root(&mut self, root: &WatchedDirectory) -> Result<(), WatcherError> {
        self.watcher.unsubscribe_prefix(&root.path);

        if root.matcher().matches(&root.path, true) {
            tracing::info!(path = %root.path.display(), "Watched directory is ignored by its own patterns");
            self.forget(&root.path);
            return Ok(());
        }

        match scan_tree(&root.path, root.matcher(), root.recurse, &mut self.watcher) {
            Ok(outcome) => {
                let (removed, inserted) = self.index.replace_prefix(&root.path, outcome.entries);
                WatcherStats::add(&self.stats.entries_removed, removed);
                WatcherStats::add(&self.stats.entries_upserted, inserted);
                self.stats.errors.fetch_add(outcome.stats.errors, Ordering::Relaxed);
                tracing::info!(
                    path = %root.path.display(),
                    entries = inserted,
                    recurse = root.recurse,
                    "Indexed watched directory"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Watched directory left unwatched");
                WatcherStats::add(&self.stats.errors, 1);
                self.forget(&root.path);
                Err(e)
            }
        }
    }

    fn index_subtree(&mut self, root: &WatchedDirectory, dir: IndexEntry) {
        let path = dir.path.clone();
        match scan_tree(&path, root.matcher(), true, &mut self.watcher) {
            Ok(outcome) => {
                let entries = std::iter::once(dir).chain(outcome.entries);
                let (removed, inserted) = self.index.replace_prefix(&path, entries);
                WatcherStats::add(&self.stats.entries_removed, removed);
                WatcherStats::add(&self.stats.entries_upserted, inserted);
                tracing::debug!(path = %path.display(), entries = inserted, "Indexed new directory");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Directory indexed but not watched");
                WatcherStats::add(&self.stats.errors, 1);
                let (removed, inserted) = self.index.replace_prefix(&path, [dir]);
                WatcherStats::add(&self.stats.entries_removed, removed);
                WatcherStats::add(&self.stats.entries_upserted, inserted);
            }
        }
    }

    fn sync_gauges(&self) {
        self.stats
            .subscriptions
            .store(self.watcher.subscription_count() as u64, Ordering::Relaxed);
    }
}

/// Build the initial index and start the watcher thread.
///
/// Blocks until every configured root has been scanned.
///
/// # Errors
///
/// Returns an error if the notification backend or the thread cannot be
/// started.
pub fn spawn(
    config_store: Arc<ConfigStore>,
    index: IndexStore,
    debounce: Duration,
) -> Result<(WatcherHandle, JoinHandle<()>), WatcherError> {
    let watcher = FileWatcher::new(debounce)?;
    let stats = WatcherStats::new();
    let mut indexer = Indexer::new(config_store, index, watcher, Arc::clone(&stats));

    for warning in indexer.start() {
        tracing::warn!("{}", warning);
    }

    let (command_tx, command_rx) = unbounded();
    let thread = std::thread::Builder::new()
        .name("kidex-watcher".to_string())
        .spawn(move || indexer.run(&command_rx))
        .map_err(|e| WatcherError::Init(e.to_string()))?;

    Ok((WatcherHandle::new(command_tx, stats), thread))
}
