//! Main application server.
//!
//! Provides the Unix socket accept loop with signal handling and graceful
//! shutdown coordination.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::dispatch::ServerState;
use super::observability::spans;
use super::protocol::{read_message, write_message, Request, Response};
use crate::config::default_socket_path;
use crate::error::IpcError;
use crate::Result;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket to listen on
    pub socket_path: PathBuf,
    /// Read and write deadline for each connection
    pub connection_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Application server.
pub struct App {
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl App {
    /// Create a new application.
    #[must_use]
    pub fn new(config: ServerConfig, state: ServerState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Token that stops [`App::serve`] when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Run the server until a shutdown request or signal.
    ///
    /// The server listens for SIGTERM and Ctrl+C, then stops accepting,
    /// lets in-flight requests finish and stops the watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn run(self) -> Result<()> {
        let token = self.shutdown_token();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown_signal() => token.cancel(),
                () = token.cancelled() => {}
            }
        });

        self.serve().await
    }

    /// Accept connections until the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn serve(self) -> Result<()> {
        let socket_path = self.config.socket_path.clone();
        let listener = bind_socket(&socket_path).await?;
        tracing::info!(socket = %socket_path.display(), "Server listening");

        let token = self.shutdown_token();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let state = Arc::clone(&self.state);
                        let timeout = self.config.connection_timeout;
                        let span = spans::connection_span(Uuid::new_v4());
                        connections.spawn(handle_connection(stream, state, timeout).instrument(span));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(self.config.connection_timeout, drain).await.is_err() {
            tracing::warn!("Aborting connections still open at shutdown");
            connections.abort_all();
        }

        if let Err(e) = fs::remove_file(&socket_path) {
            tracing::debug!(error = %e, "Socket already removed");
        }
        if let Err(e) = self.state.watcher.shutdown().await {
            tracing::debug!(error = %e, "Watcher already stopped");
        }

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Serve exactly one request on `stream`.
async fn handle_connection(mut stream: UnixStream, state: Arc<ServerState>, timeout: Duration) {
    let request = match tokio::time::timeout(timeout, read_message::<_, Request>(&mut stream)).await {
        Ok(Ok(request)) => request,
        Ok(Err(IpcError::Io(e))) => {
            tracing::debug!(error = %e, "Client went away before sending a request");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Rejected malformed request");
            if let Err(e) = respond(&mut stream, &Response::error(e.to_string()), timeout).await {
                tracing::debug!(error = %e, "Failed to report request error");
            }
            return;
        }
        Err(_) => {
            tracing::warn!("{}", IpcError::Timeout);
            return;
        }
    };

    let kind = request.kind();
    let response = state.handle(request).instrument(spans::request_span(kind)).await;

    match respond(&mut stream, &response, timeout).await {
        Ok(()) => tracing::debug!(kind, "Request served"),
        Err(e) => tracing::warn!(kind, error = %e, "Failed to send response"),
    }
}

async fn respond(stream: &mut UnixStream, response: &Response, timeout: Duration) -> std::result::Result<(), IpcError> {
    tokio::time::timeout(timeout, write_message(stream, response))
        .await
        .map_err(|_| IpcError::Timeout)?
}

/// Bind `path`, replacing a stale socket left by a crashed daemon.
async fn bind_socket(path: &Path) -> std::result::Result<UnixListener, IpcError> {
    let bind_failed = |reason: String| IpcError::BindFailed {
        address: path.display().to_string(),
        reason,
    };

    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(bind_failed("another daemon is already listening".to_string()));
        }
        tracing::debug!(socket = %path.display(), "Removing stale socket");
        fs::remove_file(path).map_err(|e| bind_failed(e.to_string()))?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| bind_failed(e.to_string()))?;
    }

    let listener = UnixListener::bind(path).map_err(|e| bind_failed(e.to_string()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| bind_failed(e.to_string()))?;

    Ok(listener)
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert!(config.socket_path.ends_with("kidex.sock"));
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kidex.sock");

        drop(bind_socket(&path).await.unwrap());
        assert!(path.exists());

        let listener = bind_socket(&path).await.unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        drop(listener);
    }

    #[tokio::test]
    async fn test_bind_refuses_live_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kidex.sock");

        let _live = bind_socket(&path).await.unwrap();
        let err = bind_socket(&path).await.unwrap_err();
        assert!(matches!(err, IpcError::BindFailed { .. }));
    }

    #[tokio::test]
    async fn test_bind_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run/kidex.sock");

        let _listener = bind_socket(&path).await.unwrap();
        assert!(path.exists());
    }
}
