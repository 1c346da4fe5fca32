//! File system watcher using notify-rs.
//!
//! Every directory is its own non-recursive subscription, so ignored
//! subtrees are never watched and a removed directory releases exactly the
//! handles below it.

#![allow(clippy::used_underscore_binding)]

use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use super::events::EventBatch;
use crate::error::WatcherError;

/// Something that can establish a watch on a directory.
pub trait Subscriber {
    /// Start watching `dir` for direct-child changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the native subscription cannot be created.
    fn subscribe(&mut self, dir: &Path) -> Result<(), WatcherError>;
}

/// Debounced file system watcher with a path-keyed subscription set.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    event_rx: Receiver<EventBatch>,
    subscriptions: BTreeSet<PathBuf>,
}

impl FileWatcher {
    /// Create a watcher that emits a batch per debounce window.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification backend cannot be initialized.
    pub fn new(debounce: Duration) -> Result<Self, WatcherError> {
        let (batch_tx, event_rx) = unbounded();

        let debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let batch = EventBatch::from_events(events);
                    if !batch.is_empty() && batch_tx.send(batch).is_err() {
                        tracing::debug!("Event receiver dropped, discarding batch");
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                }
            }
        })
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
            subscriptions: BTreeSet::new(),
        })
    }

    /// Stop watching `dir`. No-op if it was not subscribed.
    pub fn unsubscribe(&mut self, dir: &Path) -> bool {
        if !self.subscriptions.remove(dir) {
            return false;
        }
        // The kernel drops watches on deleted directories by itself.
        if let Err(e) = self._debouncer.watcher().unwatch(dir) {
            tracing::debug!(path = %dir.display(), error = %e, "Unwatch failed");
        }
        true
    }

    /// Release every subscription at or below `prefix`.
    pub fn unsubscribe_prefix(&mut self, prefix: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .subscriptions
            .range::<Path, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|p| p.starts_with(prefix))
            .cloned()
            .collect();

        for dir in &doomed {
            self.unsubscribe(dir);
        }

        if !doomed.is_empty() {
            tracing::debug!(
                path = %prefix.display(),
                released = doomed.len(),
                "Released subscriptions"
            );
        }
        doomed.len()
    }

    /// Whether `dir` is currently watched.
    #[must_use]
    pub fn is_subscribed(&self, dir: &Path) -> bool {
        self.subscriptions.contains(dir)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Channel of debounced batches.
    #[must_use]
    pub const fn events(&self) -> &Receiver<EventBatch> {
        &self.event_rx
    }
}

impl Subscriber for FileWatcher {
    fn subscribe(&mut self, dir: &Path) -> Result<(), WatcherError> {
        if self.subscriptions.contains(dir) {
            return Ok(());
        }

        self._debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::watch_failed(dir, e))?;

        self.subscriptions.insert(dir.to_path_buf());
        tracing::trace!(path = %dir.display(), "Watching directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn watcher() -> FileWatcher {
        FileWatcher::new(Duration::from_millis(50)).unwrap()
    }

    #[test]
    fn test_subscribe_nonexistent_dir() {
        let mut watcher = watcher();
        let result = watcher.subscribe(Path::new("/nonexistent/directory"));
        assert!(result.is_err());
        assert_eq!(watcher.subscription_count(), 0);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let tmp = TempDir::new().unwrap();
        let mut watcher = watcher();

        watcher.subscribe(tmp.path()).unwrap();
        watcher.subscribe(tmp.path()).unwrap();
        assert_eq!(watcher.subscription_count(), 1);
        assert!(watcher.is_subscribed(tmp.path()));

        assert!(watcher.unsubscribe(tmp.path()));
        assert!(!watcher.unsubscribe(tmp.path()));
        assert_eq!(watcher.subscription_count(), 0);
    }

    #[test]
    fn test_unsubscribe_prefix() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        let deep = sub.join("deep");
        let sibling = tmp.path().join("sub2");
        fs::create_dir_all(&deep).unwrap();
        fs::create_dir(&sibling).unwrap();

        let mut watcher = watcher();
        for dir in [tmp.path(), &sub, &deep, &sibling] {
            watcher.subscribe(dir).unwrap();
        }

        assert_eq!(watcher.unsubscribe_prefix(&sub), 2);
        assert!(watcher.is_subscribed(tmp.path()));
        assert!(watcher.is_subscribed(&sibling));
        assert!(!watcher.is_subscribed(&deep));
    }

    #[test]
    fn test_events_are_batched() {
        let tmp = TempDir::new().unwrap();
        let mut watcher = watcher();
        watcher.subscribe(tmp.path()).unwrap();

        fs::write(tmp.path().join("new.txt"), "x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline && !seen {
            if let Ok(batch) = watcher.events().recv_timeout(Duration::from_millis(200)) {
                seen = batch.paths().iter().any(|p| p.ends_with("new.txt"));
            }
        }
        assert!(seen, "expected an event for new.txt");
    }
}
