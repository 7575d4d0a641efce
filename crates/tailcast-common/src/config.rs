//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML. Every section
//! defaults sensibly so an empty file is valid and yields the stock server:
//! port 8081, a 1 s directory poll, a 5 s stall timeout and 32 KiB reads.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub recording: RecordingConfig,
    pub streaming: StreamingConfig,
    pub clients: ClientsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.recording.poll_interval_ms == 0 {
            warnings.push("recording.poll_interval_ms is 0; the monitor will spin".into());
        }

        if self.recording.stall_timeout_ms < self.streaming.poll_interval_ms {
            warnings.push(format!(
                "recording.stall_timeout_ms ({}) is shorter than streaming.poll_interval_ms ({})",
                self.recording.stall_timeout_ms, self.streaming.poll_interval_ms
            ));
        }

        if self.streaming.chunk_size == 0 {
            warnings.push("streaming.chunk_size is 0; falling back to 1 byte reads".into());
        }

        if self.streaming.growing_content_length == 0 {
            warnings.push(
                "streaming.growing_content_length is 0; clients will stop reading immediately"
                    .into(),
            );
        }

        if self.log.buffer_lines == 0 {
            warnings.push("log.buffer_lines is 0; the log operation will always be empty".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Delay between attempts while the port is still taken.
    pub bind_retry_ms: u64,
    /// Upper bound on reading the request line and headers.
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8081,
            bind_retry_ms: 1000,
            request_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_retry(&self) -> Duration {
        Duration::from_millis(self.bind_retry_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Recording directory discovery and growth tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Explicit recording directory; skips discovery when set.
    pub directory: Option<PathBuf>,
    /// Subdirectory name prefix searched for when `directory` is unset.
    pub directory_prefix: String,
    /// File names starting with any of these are never streamed.
    pub ignore_prefixes: Vec<String>,
    /// File names ending with any of these are never streamed.
    pub ignore_suffixes: Vec<String>,
    pub poll_interval_ms: u64,
    /// A file whose size has not changed for this long is no longer growing.
    pub stall_timeout_ms: u64,
    /// A newly selected file last modified longer ago than this is treated
    /// as an already stopped recording.
    pub stale_after_secs: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            directory_prefix: "LocalRecording".into(),
            ignore_prefixes: vec!["Copy".into()],
            ignore_suffixes: vec!["_".into()],
            poll_interval_ms: 1000,
            stall_timeout_ms: 5000,
            stale_after_secs: 30,
        }
    }
}

impl RecordingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Tail streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Read buffer size in bytes.
    pub chunk_size: usize,
    /// Idle wait between reads once the end of the file is reached.
    pub poll_interval_ms: u64,
    /// `Content-Length` advertised while the file is still growing.
    pub growing_content_length: u64,
}

/// 8 GiB: large enough that players keep reading a live recording.
pub const DEFAULT_GROWING_CONTENT_LENGTH: u64 = 8 * 1024 * 1024 * 1024;

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32 * 1024,
            poll_interval_ms: 200,
            growing_content_length: DEFAULT_GROWING_CONTENT_LENGTH,
        }
    }
}

impl StreamingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Per-client statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    pub stats_interval_ms: u64,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: 1000,
        }
    }
}

impl ClientsConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// In-memory operation log served by the `log` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub buffer_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            buffer_lines: 10_000,
        }
    }
}
