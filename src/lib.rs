//! kidex
//!
//! File indexing daemon: watches configured directories, keeps an in-memory
//! index of their contents and answers queries over a local socket.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod server;
pub mod storage;
pub mod watcher;

pub use config::{Config, ConfigStore, DaemonSettings};
pub use error::{Error, Result};
pub use storage::{IndexEntry, IndexStore};
