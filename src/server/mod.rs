//! IPC server and client.
//!
//! This module provides:
//! - A length-prefixed JSON protocol over a Unix socket
//! - The accept loop with graceful shutdown
//! - Request handlers backed by the index and the watcher
//! - An async client used by the `kidex` command

mod app;
mod client;
mod dispatch;
mod observability;
mod protocol;

pub use app::{App, ServerConfig};
pub use client::IndexClient;
pub use dispatch::ServerState;
pub use observability::{init_tracing, spans};
pub use protocol::{read_message, write_message, Request, Response, StatusResponse, MAX_MESSAGE_SIZE};
