//! Error types and Result aliases for kidex.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using kidex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kidex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// IPC server/client error.
    #[error("ipc error: {0}")]
    Ipc(#[from] IpcError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while loading or validating configuration.
///
/// At startup these are fatal. On reload they fail the request and the
/// previously active configuration stays in place.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration source could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not have the expected shape.
    #[error("malformed configuration: {0}")]
    Syntax(String),

    /// A watched directory is missing, unreadable or overlaps another one.
    #[error("invalid watched directory '{path}': {reason}")]
    InvalidDirectory { path: PathBuf, reason: String },

    /// An ignore pattern failed to compile.
    #[error("invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A daemon setting is out of range.
    #[error("{0}")]
    Invalid(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to establish a native watch subscription.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// A subtree could not be read during traversal.
    #[error("failed to traverse '{path}': {reason}")]
    Traversal { path: String, reason: String },

    /// The notification backend could not be created.
    #[error("failed to initialize watcher: {0}")]
    Init(String),

    /// The watcher thread is no longer running.
    #[error("watcher is not running")]
    Stopped,
}

/// IPC server/client errors.
#[derive(Error, Debug)]
pub enum IpcError {
    /// Failed to bind the local socket.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Socket I/O failure.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Message payload was not valid JSON for the expected type.
    #[error("invalid message: {0}")]
    Decode(#[from] serde_json::Error),

    /// Length prefix exceeded the allowed maximum.
    #[error("message of {0} bytes exceeds the size limit")]
    MessageTooLarge(usize),

    /// The peer stalled past the connection timeout.
    #[error("connection timed out")]
    Timeout,

    /// The server answered with an error or an unexpected response.
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WatcherError {
    /// Create a subscription failure for `path`.
    pub fn watch_failed(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::WatchFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a traversal failure for `path`.
    pub fn traversal(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::Traversal {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
