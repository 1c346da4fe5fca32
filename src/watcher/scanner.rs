//! Directory scanner for initial indexing.
//!
//! Walks a watched directory, applying the ignore matcher to every entry
//! and subscribing each directory it descends into.

use std::path::Path;

use walkdir::WalkDir;

use super::filter::PathMatcher;
use super::watcher::Subscriber;
use crate::error::WatcherError;
use crate::storage::IndexEntry;

/// Counters for one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub entries_found: u64,
    pub entries_ignored: u64,
    pub directories_watched: u64,
    pub errors: u64,
}

/// Result of walking one directory.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Non-ignored entries below the start directory, in walk order.
    pub entries: Vec<IndexEntry>,
    /// Counters for the walk.
    pub stats: ScanStats,
}

/// Subscribe `start` and collect everything below it.
///
/// Without `recurse` only direct children are visited and no further
/// subscriptions are made. Ignored directories are never descended into.
/// Symbolic links are indexed as plain entries and not followed. Unreadable
/// subtrees and failed subdirectory subscriptions are logged and skipped.
///
/// # Errors
///
/// Returns an error if `start` itself cannot be subscribed.
pub fn scan_tree(
    start: &Path,
    matcher: &PathMatcher,
    recurse: bool,
    subscriber: &mut impl Subscriber,
) -> Result<ScanOutcome, WatcherError> {
    subscriber.subscribe(start)?;

    let mut stats = ScanStats {
        directories_watched: 1,
        ..ScanStats::default()
    };

    let mut walker = WalkDir::new(start).min_depth(1).follow_links(false);
    if !recurse {
        walker = walker.max_depth(1);
    }

    let mut entries = Vec::new();
    let mut iter = walker.into_iter();

    while let Some(next) = iter.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(start);
                tracing::warn!("{}", WatcherError::traversal(path, &e));
                stats.errors += 1;
                continue;
            }
        };

        let file_type = entry.file_type();
        let is_dir = file_type.is_dir();

        // Sockets, fifos and device nodes are not indexed.
        if !is_dir && !file_type.is_file() && !file_type.is_symlink() {
            continue;
        }

        if matcher.matches(entry.path(), is_dir) {
            stats.entries_ignored += 1;
            if is_dir {
                iter.skip_current_dir();
            }
            continue;
        }

        if is_dir && recurse {
            if let Err(e) = subscriber.subscribe(entry.path()) {
                tracing::warn!("{}", e);
                stats.errors += 1;
            } else {
                stats.directories_watched += 1;
            }
        }

        let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
        entries.push(IndexEntry::new(entry.into_path(), is_dir).with_modified(modified));
        stats.entries_found += 1;
    }

    tracing::debug!(
        path = %start.display(),
        found = stats.entries_found,
        ignored = stats.entries_ignored,
        watched = stats.directories_watched,
        errors = stats.errors,
        "Directory scan complete"
    );

    Ok(ScanOutcome { entries, stats })
}
