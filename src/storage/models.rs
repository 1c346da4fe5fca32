//! Data models for the index.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One indexed filesystem path.
///
/// Parent/child relations are never stored; they follow from path prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Absolute path, unique within the store.
    pub path: PathBuf,

    /// Whether the path is a directory.
    pub is_directory: bool,

    /// Cached modification time. Only used to skip redundant writes.
    #[serde(skip)]
    pub modified: Option<SystemTime>,
}

impl IndexEntry {
    /// Create an entry without cached metadata.
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            is_directory,
            modified: None,
        }
    }

    /// Create an entry from already fetched metadata.
    #[must_use]
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            is_directory: metadata.is_dir(),
            modified: metadata.modified().ok(),
        }
    }

    /// Set the cached modification time.
    #[must_use]
    pub const fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Final path component as a lossy string.
    #[must_use]
    pub fn file_name(&self) -> std::borrow::Cow<'_, str> {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
    }
}
