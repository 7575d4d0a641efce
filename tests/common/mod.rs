//! Shared test harness for integration tests.
//!
//! Provides [`TestServer`], which monitors a temporary recording directory
//! and serves it on a random local port with short poll intervals.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use tailcast::clients::ClientTable;
use tailcast::log_buffer::{LogBuffer, LogProvider};
use tailcast::monitor::{DirectoryMonitor, RecordingStore};
use tailcast::server::{Server, ServerContext};
use tailcast_common::config::Config;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Config with intervals short enough for tests.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config.server.request_timeout_ms = 1000;
    config.recording.poll_interval_ms = 20;
    config.recording.stall_timeout_ms = 300;
    config.streaming.poll_interval_ms = 10;
    config.clients.stats_interval_ms = 50;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
    pub store: Arc<RecordingStore>,
    pub clients: Arc<ClientTable>,
    pub log: LogBuffer,
    cancel: CancellationToken,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(fast_config()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.recording.directory = Some(dir.path().to_path_buf());

        let cancel = CancellationToken::new();
        let store = Arc::new(RecordingStore::new(config.recording.stall_timeout()));
        let monitor = DirectoryMonitor::new(
            dir.path().to_path_buf(),
            &config.recording,
            Arc::clone(&store),
        );
        tokio::spawn(monitor.run(cancel.clone()));

        let server = Server::bind(&config.server, &cancel)
            .await
            .expect("failed to bind random port");
        let addr = server.local_addr().expect("failed to get local addr");

        let clients = Arc::new(ClientTable::new());
        let log = LogBuffer::new(config.log.buffer_lines);
        let provider: Arc<dyn LogProvider> = Arc::new(log.clone());
        let ctx = Arc::new(ServerContext {
            store: Arc::clone(&store),
            clients: clients.clone(),
            log: Some(provider),
            config: Arc::new(config),
            cancel: cancel.clone(),
        });
        tokio::spawn(server.run(ctx, cancel.clone()));

        Self {
            addr,
            dir,
            store,
            clients,
            log,
            cancel,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, data: &[u8]) {
        std::fs::write(self.path(name), data).expect("failed to write recording");
    }

    pub fn append(&self, name: &str, data: &[u8]) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(self.path(name))
            .expect("failed to open recording");
        file.write_all(data).expect("failed to append");
    }

    /// Write a recording whose mtime lies `secs_ago` in the past.
    pub fn write_aged(&self, name: &str, data: &[u8], secs_ago: i64) {
        self.write(name, data);
        let now = FileTime::now();
        set_file_mtime(
            self.path(name),
            FileTime::from_unix_time(now.unix_seconds() - secs_ago, 0),
        )
        .expect("failed to set mtime");
    }

    /// Wait until the monitor publishes `name` as the active file.
    pub async fn wait_for_active(&self, name: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            if self.store.active_file().is_some_and(|f| f.name == name) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "{name} never became the active file"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a raw request and read the reply until the server closes.
    pub async fn raw_request(&self, request: &str) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .expect("failed to connect");
        stream
            .write_all(request.as_bytes())
            .await
            .expect("failed to send request");
        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .expect("failed to read response");
        response
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Split a raw reply into its head and body.
pub fn split_response(response: &[u8]) -> (String, Vec<u8>) {
    let end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8_lossy(&response[..end]).into_owned();
    (head, response[end + 4..].to_vec())
}
