//! Connected client bookkeeping.
//!
//! Every accepted connection gets a [`ClientSession`] from the
//! [`ClientRegistry`]. The streamer reports progress through
//! [`SessionHandle`]; a per-connection reporter task turns the byte counter
//! into a smoothed transfer speed.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tailcast_common::format::{format_bytes, format_speed};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress sink for one streaming connection.
pub trait SessionHandle: Send + Sync {
    /// Total bytes sent so far on this connection.
    fn report_bytes(&self, total: u64);

    /// Name of the file being streamed.
    fn report_file(&self, name: &str);
}

/// Opens and closes sessions for accepted connections.
pub trait ClientRegistry: Send + Sync {
    fn new_session(&self, remote: SocketAddr) -> Arc<ClientSession>;

    /// Called exactly once per session, after the connection is done.
    fn end_session(&self, session: &Arc<ClientSession>);
}

/// One connected client.
#[derive(Debug)]
pub struct ClientSession {
    pub id: u64,
    pub remote: SocketAddr,
    pub started_at: DateTime<Utc>,
    bytes_sent: AtomicU64,
    stopped_at: Mutex<Option<DateTime<Utc>>>,
    current_file: Mutex<Option<String>>,
    /// Smoothed bytes per second.
    speed: Mutex<f64>,
    disconnected: CancellationToken,
}

impl ClientSession {
    pub fn new(id: u64, remote: SocketAddr) -> Self {
        Self {
            id,
            remote,
            started_at: Utc::now(),
            bytes_sent: AtomicU64::new(0),
            stopped_at: Mutex::new(None),
            current_file: Mutex::new(None),
            speed: Mutex::new(0.0),
            disconnected: CancellationToken::new(),
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn current_file(&self) -> Option<String> {
        self.current_file.lock().clone()
    }

    pub fn speed(&self) -> f64 {
        *self.speed.lock()
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        *self.stopped_at.lock()
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.is_cancelled()
    }

    /// Record the disconnect time and stop the stats reporter. Idempotent.
    pub fn mark_disconnected(&self) {
        let mut stopped_at = self.stopped_at.lock();
        if stopped_at.is_none() {
            *stopped_at = Some(Utc::now());
        }
        self.disconnected.cancel();
    }

    /// Time between connect and disconnect, or until now while connected.
    pub fn connected_duration(&self) -> Duration {
        let end = self.stopped_at().unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    /// Bytes per second over the whole connection.
    pub fn average_speed(&self) -> f64 {
        let secs = self.connected_duration().as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent() as f64 / secs
        } else {
            0.0
        }
    }

    /// Fold one sample into the smoothed speed and return the new value.
    fn record_sample(&self, bytes_per_sec: f64) -> f64 {
        let mut speed = self.speed.lock();
        *speed = smooth_speed(*speed, bytes_per_sec);
        *speed
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            id: self.id,
            remote: self.remote.to_string(),
            started_at: self.started_at,
            stopped_at: self.stopped_at(),
            bytes_sent: self.bytes_sent(),
            current_file: self.current_file(),
            speed: self.speed(),
        }
    }
}

impl SessionHandle for ClientSession {
    fn report_bytes(&self, total: u64) {
        self.bytes_sent.store(total, Ordering::Relaxed);
    }

    fn report_file(&self, name: &str) {
        *self.current_file.lock() = Some(name.to_string());
    }
}

impl fmt::Display for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.remote.ip(), self.remote.port())
    }
}

/// Point-in-time copy of a session for listings.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub id: u64,
    pub remote: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub bytes_sent: u64,
    pub current_file: Option<String>,
    pub speed: f64,
}

/// Halve the previous speed and add half the new sample. A sample with no
/// progress drops the speed to zero.
pub fn smooth_speed(previous: f64, current: f64) -> f64 {
    if current <= 0.0 {
        0.0
    } else {
        previous / 2.0 + current / 2.0
    }
}

/// Registry backed by a concurrent map of live sessions.
#[derive(Debug, Default)]
pub struct ClientTable {
    sessions: DashMap<u64, Arc<ClientSession>>,
    next_id: AtomicU64,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots of connected clients, oldest first.
    pub fn list(&self) -> Vec<ClientSnapshot> {
        let mut clients: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        clients.sort_by_key(|client| client.id);
        clients
    }

    /// Log every client still connected and return how many there were.
    pub fn log_connected(&self) -> usize {
        let clients = self.list();
        for client in &clients {
            tracing::info!(
                id = client.id,
                client = %client.remote,
                file = client.current_file.as_deref().unwrap_or("-"),
                since = %client.started_at.format("%Y-%m-%d %H:%M:%S"),
                "Still connected: sent {}, speed {}",
                format_bytes(client.bytes_sent),
                format_speed(client.speed)
            );
        }
        clients.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl ClientRegistry for ClientTable {
    fn new_session(&self, remote: SocketAddr) -> Arc<ClientSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(ClientSession::new(id, remote));
        self.sessions.insert(id, Arc::clone(&session));
        tracing::info!(client = %session, id, "Client connected");
        session
    }

    fn end_session(&self, session: &Arc<ClientSession>) {
        session.mark_disconnected();
        if self.sessions.remove(&session.id).is_some() {
            tracing::info!(
                client = %session,
                id = session.id,
                sent = %format_bytes(session.bytes_sent()),
                average = %format_speed(session.average_speed()),
                "Client disconnected"
            );
        }
    }
}

/// Sample a session's byte counter every `interval` until it disconnects.
pub fn spawn_stats_reporter(session: Arc<ClientSession>, interval: Duration) -> JoinHandle<()> {
    let mut last_bytes = session.bytes_sent();
    tokio::spawn(async move {
        let cancel = session.disconnected.clone();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => break,
            }

            let bytes = session.bytes_sent();
            let delta = bytes.saturating_sub(last_bytes);
            last_bytes = bytes;

            let current = delta as f64 / interval.as_secs_f64().max(f64::EPSILON);
            let speed = session.record_sample(current);
            tracing::debug!(
                client = %session,
                sent = %format_bytes(bytes),
                speed = %format_speed(speed),
                "Client stats"
            );
        }
    })
}
