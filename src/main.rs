//! kidexd - file indexing daemon
//!
//! Entry point for the daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kidex::config::{default_config_path, default_socket_path};
use kidex::server::{init_tracing, App, ServerConfig, ServerState};
use kidex::{ConfigStore, DaemonSettings, Error, IndexStore, Result};

/// kidexd - keeps an index of watched directories and serves queries
#[derive(Parser, Debug)]
#[command(name = "kidexd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Watched-directory configuration file
    #[arg(short, long, env = "KIDEX_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Unix socket to listen on
    #[arg(short, long, env = "KIDEX_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KIDEX_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "KIDEX_LOG_JSON")]
    log_json: bool,

    /// Debounce window for filesystem events, in milliseconds
    #[arg(long, env = "KIDEX_DEBOUNCE_MS", default_value = "100")]
    debounce_ms: u64,

    /// Per-connection read/write timeout, in seconds
    #[arg(long, env = "KIDEX_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,
}

impl Cli {
    fn settings(self) -> DaemonSettings {
        DaemonSettings {
            config_path: self.config,
            socket_path: self.socket,
            log_level: self.log_level,
            log_json: self.log_json,
            debounce: Duration::from_millis(self.debounce_ms),
            connection_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Cli::parse().settings();

    init_tracing(&settings.log_level, settings.log_json);

    tracing::info!("kidexd v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?settings, "Settings loaded");

    settings.validate()?;

    let config = Arc::new(ConfigStore::open(&settings.config_path)?);
    let index = IndexStore::new();

    let (handle, thread) = {
        let config = Arc::clone(&config);
        let index = index.clone();
        let debounce = settings.debounce;
        tokio::task::spawn_blocking(move || kidex::watcher::spawn(config, index, debounce))
            .await
            .map_err(|e| Error::internal(format!("Watcher startup failed: {e}")))??
    };

    let server_config = ServerConfig {
        socket_path: settings.socket_path,
        connection_timeout: settings.connection_timeout,
    };

    let app = App::new(server_config, ServerState::new(index, config, handle.clone()));
    let result = app.run().await;

    if result.is_err() {
        // The server never came up, so nothing else stops the watcher.
        if let Err(e) = handle.shutdown().await {
            tracing::debug!(error = %e, "Watcher already stopped");
        }
    }

    if thread.join().is_err() {
        tracing::error!("Watcher thread panicked");
    }
    result
}
