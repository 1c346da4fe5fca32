//! Daemon settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the daemon process.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Watched-directory configuration file.
    pub config_path: PathBuf,

    /// Unix socket the server listens on.
    pub socket_path: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON logs.
    pub log_json: bool,

    /// Debounce window for filesystem events.
    pub debounce: Duration,

    /// Per-connection read/write timeout.
    pub connection_timeout: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            socket_path: default_socket_path(),
            log_level: "info".to_string(),
            log_json: false,
            debounce: Duration::from_millis(100),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl DaemonSettings {
    /// Create settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.debounce.is_zero() {
            return Err(Error::config("debounce cannot be 0"));
        }

        if self.debounce > Duration::from_secs(60) {
            return Err(Error::config("debounce cannot exceed 60s"));
        }

        if self.connection_timeout.is_zero() {
            return Err(Error::config("connection_timeout cannot be 0"));
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::config("socket path cannot be empty"));
        }

        Ok(())
    }
}

/// Default configuration file: `$XDG_CONFIG_HOME/kidex/config.toml`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kidex")
        .join("config.toml")
}

/// Default socket path.
///
/// Prefers the per-user runtime directory, then the user cache directory.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        return runtime_dir.join("kidex.sock");
    }

    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("kidex").join("kidex.sock");
    }

    std::env::temp_dir().join("kidex.sock")
}
