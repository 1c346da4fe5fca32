//! Debounced event batches.

#![allow(clippy::missing_const_for_fn)]

use std::collections::HashSet;
use std::path::PathBuf;

use notify_debouncer_mini::DebouncedEvent;

/// Paths that changed during one debounce window.
///
/// The debouncer reports at most one event per path per window and does not
/// say what happened, so the batch only carries paths. Each path is later
/// reconciled against the filesystem. Paths are kept shallowest first so a
/// new directory is handled before anything inside it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventBatch {
    paths: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl EventBatch {
    /// Create a new empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from raw paths.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut batch = Self::new();
        for path in paths {
            batch.add(path);
        }
        batch.sort();
        batch
    }

    /// Build a batch from debouncer output.
    #[must_use]
    pub fn from_events(events: Vec<DebouncedEvent>) -> Self {
        Self::from_paths(events.into_iter().map(|e| e.path))
    }

    /// Add a path, ignoring duplicates.
    pub fn add(&mut self, path: PathBuf) {
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
    }

    fn sort(&mut self) {
        self.paths
            .sort_by_cached_key(|p| (p.components().count(), p.clone()));
    }

    /// Paths in processing order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Check if batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Get total number of paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl IntoIterator for EventBatch {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}
