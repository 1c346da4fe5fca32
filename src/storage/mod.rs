//! In-memory path index.
//!
//! This module provides:
//! - The `IndexEntry` model
//! - The shared `IndexStore` with atomic subtree operations
//! - Query evaluation over consistent snapshots

mod index;
mod models;
mod search;

pub use index::{IndexStore, Snapshot};
pub use models::IndexEntry;
pub use search::{search, CaseOption, FileType, Keyword, Query, QueryParameter, SearchOptions};
