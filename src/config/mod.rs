//! Configuration management for kidex.
//!
//! Two layers:
//! - Daemon settings from command-line arguments and environment variables
//! - The watched-directory document (TOML), reloadable at runtime

mod settings;
mod store;
mod watch;

pub use settings::{default_config_path, default_socket_path, DaemonSettings};
pub use store::ConfigStore;
pub use watch::{Config, WatchedDirectory};
