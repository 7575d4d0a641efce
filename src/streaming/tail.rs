//! Follow a file that may still be growing and copy it to a socket.
//!
//! The amount to send is fixed once, when the file is opened: a file the
//! monitor considers finished is sent up to its current length, a growing
//! one is followed until it stalls or the peer goes away.

use std::io::{self, SeekFrom};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tailcast_common::config::StreamingConfig;
use tailcast_common::error::is_disconnect_kind;
use tailcast_common::Result;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use super::socket::{PeerProbe, SocketWriter};
use crate::clients::SessionHandle;
use crate::monitor::{ActiveFile, GrowthState};

/// Streamer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailConfig {
    pub chunk_size: usize,
    /// Sleep between reads once the end of the file is reached.
    pub poll_interval: Duration,
}

impl From<&StreamingConfig> for TailConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailOutcome {
    /// All bytes of a finished file were sent.
    Complete,
    /// The file became shorter than the amount promised at open.
    Truncated,
    /// A growing file stopped growing.
    Stalled,
    /// The remote end closed the connection.
    PeerGone,
    /// Server shutdown.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailSummary {
    pub bytes_sent: u64,
    pub outcome: TailOutcome,
}

pub struct TailStreamer {
    growth: Arc<dyn GrowthState>,
    config: TailConfig,
    cancel: CancellationToken,
}

impl TailStreamer {
    pub fn new(growth: Arc<dyn GrowthState>, config: TailConfig, cancel: CancellationToken) -> Self {
        Self {
            growth,
            config,
            cancel,
        }
    }

    /// Send `file` from `offset` to `sink`.
    ///
    /// Failing to open or seek the file is an error. So is any read error and
    /// any write error other than a disconnect; a disconnect ends the stream
    /// with [`TailOutcome::PeerGone`].
    pub async fn stream<W>(
        &self,
        file: &ActiveFile,
        offset: u64,
        sink: &SocketWriter<W>,
        probe: &dyn PeerProbe,
        session: &dyn SessionHandle,
    ) -> Result<TailSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut source = File::open(&file.path).await?;
        source.seek(SeekFrom::Start(offset)).await?;

        let len_at_open = source.metadata().await?.len();
        let expected = if self.growth.is_growing(&file.name) {
            None
        } else {
            Some(len_at_open.saturating_sub(offset))
        };
        session.report_file(&file.name);

        tracing::debug!(
            file = %file.name,
            offset,
            expected = ?expected,
            "Tailing file"
        );

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut sent: u64 = 0;
        let mut last_data = Instant::now();

        let outcome = loop {
            if !probe.is_peer_alive().await {
                break TailOutcome::PeerGone;
            }

            // Drain whatever is available right now.
            loop {
                if self.cancel.is_cancelled() {
                    return Ok(TailSummary {
                        bytes_sent: sent,
                        outcome: TailOutcome::Cancelled,
                    });
                }

                let want = match expected {
                    Some(total) => {
                        let remaining = total.saturating_sub(sent);
                        usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()))
                    }
                    None => buf.len(),
                };
                if want == 0 {
                    break;
                }

                let n = source.read(&mut buf[..want]).await?;
                if n == 0 {
                    break;
                }

                if let Err(e) = sink.write_all(&buf[..n]).await {
                    return disconnect_or_error(e, sent);
                }
                sent += n as u64;
                session.report_bytes(sent);
                last_data = Instant::now();
            }

            if let Err(e) = sink.flush().await {
                return disconnect_or_error(e, sent);
            }

            match expected {
                Some(total) if sent >= total => break TailOutcome::Complete,
                Some(total) => {
                    let current_len = source.metadata().await?.len();
                    if current_len < offset.saturating_add(total) {
                        break TailOutcome::Truncated;
                    }
                }
                None => {
                    let idle = last_data.elapsed() >= self.growth.stall_timeout();
                    if self.growth.is_stalled(&file.name)
                        || (idle && !self.growth.is_growing(&file.name))
                    {
                        break TailOutcome::Stalled;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.cancel.cancelled() => break TailOutcome::Cancelled,
            }
        };

        Ok(TailSummary {
            bytes_sent: sent,
            outcome,
        })
    }
}

fn disconnect_or_error(e: io::Error, sent: u64) -> Result<TailSummary> {
    if is_disconnect_kind(e.kind()) {
        Ok(TailSummary {
            bytes_sent: sent,
            outcome: TailOutcome::PeerGone,
        })
    } else {
        Err(e.into())
    }
}
