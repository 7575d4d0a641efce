//! TCP front end: bind with retry, accept loop, graceful shutdown.

pub mod protocol;
pub mod session;

pub use session::handle_connection;

use std::net::SocketAddr;
use std::sync::Arc;

use tailcast_common::config::{Config, ServerConfig};
use tailcast_common::{Error, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::clients::{ClientRegistry, ClientTable};
use crate::log_buffer::LogProvider;
use crate::monitor::{resolve_recording_directory, DirectoryMonitor, RecordingStore};

/// Everything a connection task needs.
pub struct ServerContext {
    pub store: Arc<RecordingStore>,
    pub clients: Arc<dyn ClientRegistry>,
    pub log: Option<Arc<dyn LogProvider>>,
    pub config: Arc<Config>,
    /// Fires on shutdown; running streams stop at their next wait.
    pub cancel: CancellationToken,
}

/// A bound listener.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind `host:port`, retrying every `bind_retry_ms` while the address is
    /// in use. Gives up only when `cancel` fires.
    pub async fn bind(config: &ServerConfig, cancel: &CancellationToken) -> Result<Self> {
        let mut attempts = 0u32;
        loop {
            match TcpListener::bind((config.host.as_str(), config.port)).await {
                Ok(listener) => {
                    let addr = listener.local_addr()?;
                    tracing::info!("Server listening on {addr}");
                    return Ok(Self { listener });
                }
                Err(e) => {
                    attempts += 1;
                    if attempts == 1 {
                        tracing::warn!(
                            "Failed to bind {}:{}: {e}; retrying every {} ms",
                            config.host,
                            config.port,
                            config.bind_retry_ms
                        );
                    } else {
                        tracing::debug!(attempts, "Bind retry failed: {e}");
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(config.bind_retry()) => {}
                _ = cancel.cancelled() => {
                    return Err(Error::Internal("shutdown requested before the server was bound".into()));
                }
            }
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires. Each connection runs in its
    /// own task.
    pub async fn run(self, ctx: Arc<ServerContext>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::trace!("Failed to set TCP_NODELAY: {e}");
                            }
                            tokio::spawn(handle_connection(stream, peer, Arc::clone(&ctx)));
                        }
                        Err(e) => {
                            tracing::debug!("Accept error: {e}");
                        }
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

/// Start tailcast: monitor the recording directory and serve it until a
/// shutdown signal arrives.
pub async fn start(config: Config, log: Option<Arc<dyn LogProvider>>) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let base = std::env::current_dir()?;
    let directory = resolve_recording_directory(&config.recording, &base);
    if !directory.is_dir() {
        tracing::warn!("Recording directory {} does not exist yet", directory.display());
    }

    let config = Arc::new(config);
    let store = Arc::new(RecordingStore::new(config.recording.stall_timeout()));
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_cancel.clone()).await;
        signal_cancel.cancel();
    });

    let monitor = DirectoryMonitor::new(directory, &config.recording, Arc::clone(&store));
    let monitor_handle = tokio::spawn(monitor.run(cancel.clone()));

    let server = match Server::bind(&config.server, &cancel).await {
        Ok(server) => server,
        Err(e) => {
            cancel.cancel();
            let _ = monitor_handle.await;
            return Err(e);
        }
    };

    let clients = Arc::new(ClientTable::new());
    let ctx = Arc::new(ServerContext {
        store,
        clients: clients.clone(),
        log,
        config,
        cancel: cancel.clone(),
    });
    server.run(ctx, cancel.clone()).await;

    cancel.cancel();
    let _ = monitor_handle.await;

    let remaining = clients.log_connected();
    if remaining > 0 {
        tracing::info!("{remaining} client(s) connected at shutdown");
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => return,
    }

    tracing::info!("Shutdown signal received");
}
