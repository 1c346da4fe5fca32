//! File system watching and indexing.
//!
//! This module provides:
//! - Per-directory watching using notify-rs with debouncing
//! - Gitignore-style path filtering
//! - Initial traversal and incremental reconciliation of the index

mod events;
mod filter;
mod handler;
mod indexer;
mod scanner;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::EventBatch;
pub use filter::PathMatcher;
pub use handler::{ReloadReport, WatcherCommand, WatcherHandle, WatcherStats, WatcherStatsSnapshot};
pub use indexer::{spawn, Indexer};
pub use scanner::{scan_tree, ScanOutcome, ScanStats};
pub use watcher::{FileWatcher, Subscriber};
