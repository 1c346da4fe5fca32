//! Protocol messages for client-server communication.
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message
//!
//! Each connection carries exactly one request and one response.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::IpcError;
use crate::storage::{IndexEntry, SearchOptions};
use crate::watcher::WatcherStatsSnapshot;

/// Upper bound for a single framed message.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Request from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Request {
    /// Search the index.
    Query(SearchOptions),
    /// Re-read the configuration file and reconcile watched directories.
    ReloadConfig,
    /// Rebuild the index from the filesystem.
    Reindex,
    /// Dump the index, optionally below one directory.
    GetIndex {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// Server statistics.
    Status,
    /// Stop the daemon.
    Shutdown,
}

impl Request {
    /// Wire name of the request kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::ReloadConfig => "reload-config",
            Self::Reindex => "reindex",
            Self::GetIndex { .. } => "get-index",
            Self::Status => "status",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Server status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub indexed_entries: usize,
    pub watched_roots: Vec<PathBuf>,
    pub watcher: WatcherStatsSnapshot,
}

/// Response from server to client.
///
/// Untagged so the wire shapes stay `{ "entries": [...] }` and
/// `{ "ok": bool, ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Matching entries.
    Entries { entries: Vec<IndexEntry> },
    /// Server status.
    Status(StatusResponse),
    /// Outcome of a command.
    Ack {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
}

impl Response {
    /// Successful acknowledgement.
    #[must_use]
    pub const fn ok() -> Self {
        Self::Ack {
            ok: true,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Successful acknowledgement carrying non-fatal warnings.
    #[must_use]
    pub const fn ok_with_warnings(warnings: Vec<String>) -> Self {
        Self::Ack {
            ok: true,
            error: None,
            warnings,
        }
    }

    /// Failed request.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Ack {
            ok: false,
            error: Some(message.into()),
            warnings: Vec::new(),
        }
    }

    /// Entry listing.
    #[must_use]
    pub const fn entries(entries: Vec<IndexEntry>) -> Self {
        Self::Entries { entries }
    }

    /// Turn an error acknowledgement into an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Server`] if the response reports a failure.
    pub fn into_result(self) -> Result<Self, IpcError> {
        match self {
            Self::Ack {
                ok: false, error, ..
            } => Err(IpcError::Server(
                error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Ok(other),
        }
    }
}

/// Write a message to a stream with length prefix.
///
/// # Errors
///
/// Returns an error if the message cannot be encoded, is too large or the
/// stream fails.
pub async fn write_message<W>(writer: &mut W, msg: &impl Serialize) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge(json.len()));
    }
    let len = u32::try_from(json.len()).map_err(|_| IpcError::MessageTooLarge(json.len()))?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a message from a stream with length prefix.
///
/// # Errors
///
/// Returns an error if the stream fails, the declared length exceeds
/// [`MAX_MESSAGE_SIZE`] or the payload does not decode.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}
