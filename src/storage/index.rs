//! In-memory index store.
//!
//! The store is a `BTreeMap` keyed by absolute path behind a
//! `parking_lot::RwLock`. The map itself lives in an `Arc` so readers take a
//! snapshot by cloning a pointer. `Path` orders component-wise, which keeps
//! every subtree contiguous and makes prefix removal a range scan.
//!
//! Writers are serialized by a separate mutex. With no snapshot alive a
//! writer edits the map in place under the write lock. While a snapshot is
//! alive the writer edits a private copy and the write lock is held only to
//! publish it, so queries never wait on a copy of the whole map.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::models::IndexEntry;

type EntryMap = BTreeMap<PathBuf, IndexEntry>;

#[derive(Default)]
struct Shared {
    map: RwLock<Arc<EntryMap>>,
    writer: Mutex<()>,
}

/// Shared, thread-safe index of filesystem entries.
///
/// Clone is cheap - it just clones the Arc.
#[derive(Clone, Default)]
pub struct IndexStore {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("entries", &self.len())
            .finish()
    }
}

/// Exclusive right to change the store.
struct Writer<'a> {
    shared: &'a Shared,
    _serial: MutexGuard<'a, ()>,
}

impl Writer<'_> {
    /// The published map. No other writer can replace it meanwhile.
    fn current(&self) -> Arc<EntryMap> {
        Arc::clone(&*self.shared.map.read())
    }

    fn apply<R>(self, edit: impl FnOnce(&mut EntryMap) -> R) -> R {
        let current = self.current();
        // The store's own reference plus `current`.
        if Arc::strong_count(&current) > 2 {
            let mut next = EntryMap::clone(&current);
            drop(current);
            let result = edit(&mut next);
            let previous = std::mem::replace(&mut *self.shared.map.write(), Arc::new(next));
            // May be the last reference; free it outside the lock.
            drop(previous);
            return result;
        }
        drop(current);

        // A snapshot taken since the check above makes this copy instead.
        let mut guard = self.shared.map.write();
        edit(Arc::make_mut(&mut *guard))
    }
}

impl IndexStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn writer(&self) -> Writer<'_> {
        Writer {
            shared: &*self.inner,
            _serial: self.inner.writer.lock(),
        }
    }

    /// Insert or replace the entry at `entry.path`.
    ///
    /// Returns `false` when an identical entry was already present, in which
    /// case the store is not touched.
    pub fn upsert(&self, entry: IndexEntry) -> bool {
        let writer = self.writer();
        if writer.current().get(&entry.path) == Some(&entry) {
            return false;
        }
        writer.apply(|map| map.insert(entry.path.clone(), entry));
        true
    }

    /// Upsert several entries in one critical section.
    pub fn upsert_many(&self, entries: impl IntoIterator<Item = IndexEntry>) -> usize {
        let writer = self.writer();
        let current = writer.current();
        let changed: Vec<IndexEntry> = entries
            .into_iter()
            .filter(|entry| current.get(&entry.path) != Some(entry))
            .collect();
        drop(current);

        if changed.is_empty() {
            return 0;
        }
        let count = changed.len();
        writer.apply(|map| map.extend(changed.into_iter().map(|e| (e.path.clone(), e))));
        count
    }

    /// Remove exactly one entry. No-op when absent.
    pub fn remove(&self, path: &Path) -> bool {
        let writer = self.writer();
        if !writer.current().contains_key(path) {
            return false;
        }
        writer.apply(|map| map.remove(path).is_some())
    }

    /// Remove `prefix` and every entry below it.
    ///
    /// Matching is component-wise: removing `/a/b` leaves `/a/bc` alone.
    pub fn remove_prefix(&self, prefix: &Path) -> usize {
        let writer = self.writer();
        let keys = subtree_keys(&writer.current(), prefix);
        if keys.is_empty() {
            return 0;
        }
        writer.apply(|map| {
            for key in &keys {
                map.remove(key);
            }
        });
        keys.len()
    }

    /// Swap the subtree at `prefix` for `entries` atomically.
    ///
    /// Readers observe either the old subtree or the new one, never a mix.
    /// Returns `(removed, inserted)`.
    pub fn replace_prefix(
        &self,
        prefix: &Path,
        entries: impl IntoIterator<Item = IndexEntry>,
    ) -> (usize, usize) {
        let entries: Vec<IndexEntry> = entries.into_iter().collect();
        debug_assert!(entries.iter().all(|e| e.path.starts_with(prefix)));

        let writer = self.writer();
        let keys = subtree_keys(&writer.current(), prefix);
        if keys.is_empty() && entries.is_empty() {
            return (0, 0);
        }

        let inserted = entries.len();
        writer.apply(|map| {
            for key in &keys {
                map.remove(key);
            }
            map.extend(entries.into_iter().map(|e| (e.path.clone(), e)));
        });

        (keys.len(), inserted)
    }

    /// Look up a single entry.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<IndexEntry> {
        self.inner.map.read().get(path).cloned()
    }

    /// Check whether `path` is indexed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.inner.map.read().contains_key(path)
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.map.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.map.read().is_empty()
    }

    /// Point-in-time view of every entry.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: Arc::clone(&*self.inner.map.read()),
            predicate: all_entries,
        }
    }

    /// Point-in-time view of the entries satisfying `predicate`.
    ///
    /// Filtering is lazy and the view can be iterated any number of times;
    /// later writes to the store are not visible through it.
    pub fn snapshot_matching<F>(&self, predicate: F) -> Snapshot<F>
    where
        F: Fn(&IndexEntry) -> bool,
    {
        Snapshot {
            entries: Arc::clone(&*self.inner.map.read()),
            predicate,
        }
    }
}

fn all_entries(_: &IndexEntry) -> bool {
    true
}

fn subtree_range<'a>(
    map: &'a EntryMap,
    prefix: &'a Path,
) -> impl Iterator<Item = (&'a PathBuf, &'a IndexEntry)> + 'a {
    map.range::<Path, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
}

fn subtree_keys(map: &EntryMap, prefix: &Path) -> Vec<PathBuf> {
    subtree_range(map, prefix).map(|(k, _)| k.clone()).collect()
}

/// Consistent, restartable view over the store at one point in time.
pub struct Snapshot<F = fn(&IndexEntry) -> bool> {
    entries: Arc<EntryMap>,
    predicate: F,
}

impl<F> Snapshot<F>
where
    F: Fn(&IndexEntry) -> bool,
{
    /// Iterate matching entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.values().filter(move |e| (self.predicate)(*e))
    }

    /// Iterate matching entries strictly below `prefix`.
    pub fn iter_under<'a>(&'a self, prefix: &'a Path) -> impl Iterator<Item = &'a IndexEntry> + 'a {
        subtree_range(&self.entries, prefix)
            .map(|(_, e)| e)
            .filter(move |e| e.path.as_path() != prefix && (self.predicate)(*e))
    }

    /// Collect matching entries.
    #[must_use]
    pub fn to_vec(&self) -> Vec<IndexEntry> {
        self.iter().cloned().collect()
    }

    /// Number of matching entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}
