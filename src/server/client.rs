//! Client for the daemon socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;

use super::protocol::{read_message, write_message, Request, Response, StatusResponse};
use crate::error::IpcError;
use crate::storage::{IndexEntry, SearchOptions};

/// One-request-per-connection client.
#[derive(Debug, Clone)]
pub struct IndexClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl IndexClient {
    /// Client for the daemon listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Deadline for connecting, sending and receiving.
    ///
    /// Reload and reindex wait for the daemon to rescan, so keep this generous.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Socket this client talks to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable, times out or sends
    /// something undecodable.
    pub async fn request(&self, request: &Request) -> Result<Response, IpcError> {
        let exchange = async {
            let mut stream = UnixStream::connect(&self.socket_path).await?;
            write_message(&mut stream, request).await?;
            read_message(&mut stream).await
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| IpcError::Timeout)?
    }

    /// Search the index.
    ///
    /// # Errors
    ///
    /// See [`IndexClient::request`]; also fails if the daemon rejects the query.
    pub async fn query(&self, options: SearchOptions) -> Result<Vec<IndexEntry>, IpcError> {
        self.request_entries(&Request::Query(options)).await
    }

    /// Every entry, or the entries below `path`.
    ///
    /// # Errors
    ///
    /// Fails if `path` is not an indexed directory.
    pub async fn get_index(&self, path: Option<PathBuf>) -> Result<Vec<IndexEntry>, IpcError> {
        self.request_entries(&Request::GetIndex { path }).await
    }

    /// Ask the daemon to reload its configuration. Returns reload warnings.
    ///
    /// # Errors
    ///
    /// Fails with the daemon's message if the new configuration is invalid.
    pub async fn reload_config(&self) -> Result<Vec<String>, IpcError> {
        self.request_ack(&Request::ReloadConfig).await
    }

    /// Ask the daemon to rebuild its index. Returns warnings.
    ///
    /// # Errors
    ///
    /// See [`IndexClient::request`].
    pub async fn reindex(&self) -> Result<Vec<String>, IpcError> {
        self.request_ack(&Request::Reindex).await
    }

    /// Daemon statistics.
    ///
    /// # Errors
    ///
    /// See [`IndexClient::request`].
    pub async fn status(&self) -> Result<StatusResponse, IpcError> {
        match self.request(&Request::Status).await?.into_result()? {
            Response::Status(status) => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    /// Stop the daemon.
    ///
    /// # Errors
    ///
    /// See [`IndexClient::request`].
    pub async fn shutdown(&self) -> Result<(), IpcError> {
        self.request_ack(&Request::Shutdown).await.map(drop)
    }

    async fn request_entries(&self, request: &Request) -> Result<Vec<IndexEntry>, IpcError> {
        match self.request(request).await?.into_result()? {
            Response::Entries { entries } => Ok(entries),
            other => Err(unexpected(&other)),
        }
    }

    async fn request_ack(&self, request: &Request) -> Result<Vec<String>, IpcError> {
        match self.request(request).await?.into_result()? {
            Response::Ack { warnings, .. } => Ok(warnings),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> IpcError {
    IpcError::Server(format!("unexpected response: {response:?}"))
}
