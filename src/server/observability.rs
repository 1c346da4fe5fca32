//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Plain or JSON output
//! - `RUST_LOG` overrides for the configured level
//! - Per-connection spans

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing for the daemon.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this twice is
/// harmless: the second installation attempt is ignored.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    if installed.is_ok() {
        tracing::debug!("Tracing initialized: level={}, json={}", level, json);
    }
}

/// Span helpers.
pub mod spans {
    use tracing::{info_span, Span};
    use uuid::Uuid;

    /// Span covering one client connection.
    #[must_use]
    pub fn connection_span(id: Uuid) -> Span {
        info_span!("connection", id = %id)
    }

    /// Span for a dispatched request.
    #[must_use]
    pub fn request_span(kind: &str) -> Span {
        info_span!("request", kind = %kind)
    }
}
