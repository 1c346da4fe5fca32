//! Integration tests for the daemon: watcher, index and socket server
//! running together.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kidex::server::{read_message, write_message, App, IndexClient, Response, ServerConfig, ServerState};
use kidex::storage::SearchOptions;
use kidex::{ConfigStore, IndexStore};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEBOUNCE: Duration = Duration::from_millis(50);
const PATIENCE: Duration = Duration::from_secs(10);

/// Poll a condition until it holds or `PATIENCE` runs out.
macro_rules! eventually {
    ($cond:expr) => {{
        let deadline = tokio::time::Instant::now() + PATIENCE;
        loop {
            if $cond {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }};
}

struct Daemon {
    _state_dir: TempDir,
    config_file: PathBuf,
    socket: PathBuf,
    client: IndexClient,
    token: CancellationToken,
    server: JoinHandle<kidex::Result<()>>,
}

impl Daemon {
    async fn start(config_text: &str) -> Self {
        Self::start_with_timeout(config_text, Duration::from_secs(5)).await
    }

    async fn start_with_timeout(config_text: &str, connection_timeout: Duration) -> Self {
        let state_dir = TempDir::new().unwrap();
        let config_file = state_dir.path().join("config.toml");
        let socket = state_dir.path().join("kidex.sock");
        fs::write(&config_file, config_text).unwrap();

        let config = Arc::new(ConfigStore::open(&config_file).unwrap());
        let index = IndexStore::new();
        let (watcher, _thread) =
            kidex::watcher::spawn(Arc::clone(&config), index.clone(), DEBOUNCE).unwrap();

        let app = App::new(
            ServerConfig {
                socket_path: socket.clone(),
                connection_timeout,
            },
            ServerState::new(index, config, watcher),
        );
        let token = app.shutdown_token();
        let server = tokio::spawn(app.serve());

        assert!(eventually!(socket.exists()), "server never bound its socket");

        Self {
            _state_dir: state_dir,
            config_file,
            client: IndexClient::new(&socket),
            socket,
            token,
            server,
        }
    }

    async fn paths(&self) -> Vec<PathBuf> {
        self.client
            .get_index(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    async fn contains(&self, path: &Path) -> bool {
        self.paths().await.iter().any(|p| p == path)
    }

    async fn stop(self) {
        self.token.cancel();
        self.server.await.unwrap().unwrap();
    }
}

fn root_config(roots: &[(&Path, bool)], global: &[&str]) -> String {
    let global: Vec<String> = global.iter().map(|p| format!("\"{p}\"")).collect();
    let mut text = format!("ignored = [{}]\n", global.join(", "));
    for (path, recurse) in roots {
        text.push_str(&format!(
            "\n[[directories]]\npath = \"{}\"\nrecurse = {recurse}\n",
            path.display()
        ));
    }
    text
}

#[tokio::test]
async fn test_ignored_file_never_indexed() {
    let root = TempDir::new().unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &["*.tmp"])).await;

    let b = root.path().join("b");
    fs::create_dir(&b).unwrap();
    fs::write(b.join("c.tmp"), "scratch").unwrap();
    fs::write(b.join("marker.txt"), "").unwrap();

    let marker = b.join("marker.txt");
    assert!(eventually!(daemon.contains(&marker).await), "marker never indexed");
    assert!(daemon.contains(&b).await);
    assert!(!daemon.contains(&b.join("c.tmp")).await);

    daemon.stop().await;
}

#[tokio::test]
async fn test_non_recursive_root_skips_nested_files() {
    let root = TempDir::new().unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), false)], &[])).await;

    let sub = root.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("f.txt"), "").unwrap();

    assert!(eventually!(daemon.contains(&sub).await), "sub never indexed");
    tokio::time::sleep(DEBOUNCE * 6).await;
    assert!(!daemon.contains(&sub.join("f.txt")).await);

    daemon.stop().await;
}

#[tokio::test]
async fn test_query_filter() {
    let root = TempDir::new().unwrap();
    let docs = root.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("report.pdf"), "").unwrap();
    fs::write(docs.join("readme.md"), "").unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;

    let found = daemon
        .client
        .query(SearchOptions::with_filter("report"))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, docs.join("report.pdf"));
    assert!(!found[0].is_directory);

    daemon.stop().await;
}

#[tokio::test]
async fn test_reload_purges_removed_directory() {
    let old = TempDir::new().unwrap();
    let new = TempDir::new().unwrap();
    fs::create_dir(old.path().join("nested")).unwrap();
    fs::write(old.path().join("nested/a.txt"), "").unwrap();
    fs::write(new.path().join("b.txt"), "").unwrap();
    let daemon = Daemon::start(&root_config(&[(old.path(), true)], &[])).await;
    assert_eq!(daemon.paths().await.len(), 2);

    fs::write(&daemon.config_file, root_config(&[(new.path(), true)], &[])).unwrap();
    let warnings = daemon.client.reload_config().await.unwrap();
    assert!(warnings.is_empty());

    assert_eq!(daemon.paths().await, vec![new.path().join("b.txt")]);
    let status = daemon.client.status().await.unwrap();
    assert_eq!(status.watched_roots, vec![new.path().to_path_buf()]);

    // The old root is no longer watched.
    fs::write(old.path().join("late.txt"), "").unwrap();
    tokio::time::sleep(DEBOUNCE * 6).await;
    assert!(!daemon.contains(&old.path().join("late.txt")).await);

    daemon.stop().await;
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_config() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("kept.txt"), "").unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;

    fs::write(&daemon.config_file, "[[directories]]\npath = \"/definitely/missing\"\nrecurse = true\n").unwrap();
    assert!(daemon.client.reload_config().await.is_err());

    assert!(daemon.contains(&root.path().join("kept.txt")).await);
    let status = daemon.client.status().await.unwrap();
    assert_eq!(status.watched_roots, vec![root.path().to_path_buf()]);

    daemon.stop().await;
}

#[tokio::test]
async fn test_create_then_delete_leaves_path_absent() {
    let root = TempDir::new().unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;

    let transient = root.path().join("transient.txt");
    fs::write(&transient, "").unwrap();
    assert!(eventually!(daemon.contains(&transient).await));

    fs::remove_file(&transient).unwrap();
    fs::write(root.path().join("after.txt"), "").unwrap();

    let after = root.path().join("after.txt");
    assert!(eventually!(daemon.contains(&after).await));
    assert!(!daemon.contains(&transient).await);

    daemon.stop().await;
}

#[tokio::test]
async fn test_deleted_directory_removes_subtree() {
    let root = TempDir::new().unwrap();
    let proj = root.path().join("proj");
    fs::create_dir_all(proj.join("src")).unwrap();
    fs::write(proj.join("src/main.rs"), "").unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;
    assert_eq!(daemon.paths().await.len(), 3);

    fs::remove_dir_all(&proj).unwrap();
    assert!(eventually!(daemon.paths().await.is_empty()));

    daemon.stop().await;
}

#[tokio::test]
async fn test_malformed_request_gets_error_response() {
    let root = TempDir::new().unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;

    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();
    write_message(&mut stream, &serde_json::json!({"kind": "explode"}))
        .await
        .unwrap();
    let response: Response = read_message(&mut stream).await.unwrap();
    assert!(matches!(response, Response::Ack { ok: false, .. }));

    // The server keeps serving.
    assert!(daemon.client.status().await.is_ok());
    daemon.stop().await;
}

#[tokio::test]
async fn test_shutdown_request_stops_server() {
    let root = TempDir::new().unwrap();
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;

    daemon.client.shutdown().await.unwrap();
    daemon.server.await.unwrap().unwrap();

    assert!(!daemon.socket.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_during_reload_see_whole_root() {
    const FILES: usize = 2000;

    let root = TempDir::new().unwrap();
    for i in 0..FILES {
        fs::write(root.path().join(format!("keep_{i}.txt")), "").unwrap();
        fs::write(root.path().join(format!("drop_{i}.log")), "").unwrap();
    }
    let daemon = Daemon::start(&root_config(&[(root.path(), true)], &[])).await;
    assert_eq!(daemon.paths().await.len(), FILES * 2);

    fs::write(&daemon.config_file, root_config(&[(root.path(), true)], &["*.log"])).unwrap();
    let reloader = daemon.client.clone();
    let reload = tokio::spawn(async move { reloader.reload_config().await });

    let mut observed = Vec::new();
    while !reload.is_finished() {
        observed.push(daemon.paths().await.len());
    }
    assert!(reload.await.unwrap().unwrap().is_empty());
    observed.push(daemon.paths().await.len());

    assert!(
        observed.iter().all(|&n| n == FILES * 2 || n == FILES),
        "saw a partially rebuilt root: {observed:?}"
    );
    assert_eq!(observed.last(), Some(&FILES));

    daemon.stop().await;
}

#[tokio::test]
async fn test_stalled_client_is_dropped() {
    let root = TempDir::new().unwrap();
    let daemon = Daemon::start_with_timeout(
        &root_config(&[(root.path(), true)], &[]),
        Duration::from_millis(300),
    )
    .await;

    // Announce a 100-byte request, send part of it and stall.
    let mut stalled = UnixStream::connect(&daemon.socket).await.unwrap();
    stalled.write_all(&100u32.to_le_bytes()).await.unwrap();
    stalled.write_all(b"{\"kind\"").await.unwrap();

    // Other clients and the watcher are unaffected meanwhile.
    assert!(daemon.client.status().await.is_ok());
    let fresh = root.path().join("fresh.txt");
    fs::write(&fresh, "").unwrap();
    assert!(eventually!(daemon.contains(&fresh).await), "fresh.txt never indexed");

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(PATIENCE, stalled.read(&mut buf))
        .await
        .expect("server kept the stalled connection open");
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected reply: {read:?}");

    assert!(daemon.client.status().await.is_ok());
    daemon.stop().await;
}
