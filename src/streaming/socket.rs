//! Shared socket writer and peer liveness probing.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use async_trait::async_trait;
use tailcast_common::error::is_disconnect_kind;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Answers whether the remote end of a connection is still there.
#[async_trait]
pub trait PeerProbe: Send + Sync {
    async fn is_peer_alive(&self) -> bool;
}

/// Write half of a connection, shared between data writes and the liveness
/// probe. Every operation holds the same lock, so a probe never interleaves
/// with a partially written chunk.
pub struct SocketWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SocketWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> SocketWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.inner.lock().await.write_all(buf).await
    }

    pub async fn flush(&self) -> io::Result<()> {
        self.inner.lock().await.flush().await
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }

    /// Issue a zero-length write without waiting on back-pressure.
    ///
    /// `Ok(())` means the write was accepted or would block; an error is the
    /// socket reporting its current failure state.
    pub async fn probe(&self) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        let writer = &mut *guard;
        std::future::poll_fn(|cx| match Pin::new(&mut *writer).poll_write(cx, &[]) {
            Poll::Ready(result) => Poll::Ready(result.map(|_| ())),
            Poll::Pending => Poll::Ready(Ok(())),
        })
        .await
    }
}

#[async_trait]
impl<W> PeerProbe for SocketWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn is_peer_alive(&self) -> bool {
        match self.probe().await {
            Ok(()) => true,
            Err(e) if is_disconnect_kind(e.kind()) => false,
            Err(e) => {
                tracing::debug!("Liveness probe failed: {e}");
                false
            }
        }
    }
}
