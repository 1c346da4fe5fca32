//! Request handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::protocol::{Request, Response, StatusResponse};
use crate::config::ConfigStore;
use crate::storage::{search, IndexStore, SearchOptions};
use crate::watcher::{ReloadReport, WatcherHandle};

/// Shared state for all connections.
#[derive(Debug)]
pub struct ServerState {
    pub index: IndexStore,
    pub config: Arc<ConfigStore>,
    pub watcher: WatcherHandle,
    pub shutdown: CancellationToken,
    started: Instant,
}

impl ServerState {
    /// Create state for a freshly started server.
    #[must_use]
    pub fn new(index: IndexStore, config: Arc<ConfigStore>, watcher: WatcherHandle) -> Self {
        Self {
            index,
            config,
            watcher,
            shutdown: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    /// Handle one decoded request.
    ///
    /// Never fails: every error becomes an `{ ok: false }` response.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Query(options) => self.handle_query(options).await,
            Request::ReloadConfig => match self.watcher.reload().await {
                Ok(report) => report_response(report),
                Err(e) => Response::error(e.to_string()),
            },
            Request::Reindex => match self.watcher.reindex().await {
                Ok(report) => report_response(report),
                Err(e) => Response::error(e.to_string()),
            },
            Request::GetIndex { path } => self.handle_get_index(path.as_deref()),
            Request::Status => self.handle_status(),
            Request::Shutdown => {
                tracing::info!("Shutdown requested by client");
                self.shutdown.cancel();
                Response::ok()
            }
        }
    }

    async fn handle_query(&self, options: SearchOptions) -> Response {
        let index = self.index.clone();
        match tokio::task::spawn_blocking(move || search(&index, &options)).await {
            Ok(entries) => Response::entries(entries),
            Err(e) => Response::error(format!("query failed: {e}")),
        }
    }

    fn handle_get_index(&self, path: Option<&Path>) -> Response {
        let snapshot = self.index.snapshot();
        let Some(path) = path else {
            return Response::entries(snapshot.to_vec());
        };

        let is_root = self
            .config
            .active()
            .directories
            .iter()
            .any(|d| d.path == path);
        let is_indexed_dir = self.index.get(path).is_some_and(|e| e.is_directory);

        if !is_root && !is_indexed_dir {
            return Response::error(format!("not an indexed directory: {}", path.display()));
        }
        Response::entries(snapshot.iter_under(path).cloned().collect())
    }

    fn handle_status(&self) -> Response {
        Response::Status(StatusResponse {
            uptime_secs: self.started.elapsed().as_secs(),
            indexed_entries: self.index.len(),
            watched_roots: self.config.active().root_paths(),
            watcher: self.watcher.stats(),
        })
    }
}

fn report_response(report: ReloadReport) -> Response {
    Response::ok_with_warnings(report.warnings)
}
