//! One client connection, from request to close.

use std::net::SocketAddr;
use std::sync::Arc;

use tailcast_common::format::{format_bytes, format_speed};
use tailcast_common::{Error, Result};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use super::protocol::{content_type_for, read_request, Operation, Request, ResponseHead};
use super::ServerContext;
use crate::clients::{spawn_stats_reporter, ClientRegistry, ClientSession};
use crate::monitor::{ActiveFile, GrowthState};
use crate::range::parse_offset;
use crate::streaming::{SocketWriter, TailConfig, TailOutcome, TailStreamer};

/// Ends the registry session when the connection task finishes, whichever
/// way it finishes.
struct SessionGuard {
    registry: Arc<dyn ClientRegistry>,
    session: Arc<ClientSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.end_session(&self.session);
    }
}

/// Serve one connection: read the request, dispatch it, close.
///
/// Errors never escape; they are logged against the client.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let session = ctx.clients.new_session(peer);
    let _guard = SessionGuard {
        registry: Arc::clone(&ctx.clients),
        session: Arc::clone(&session),
    };
    spawn_stats_reporter(Arc::clone(&session), ctx.config.clients.stats_interval());

    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let writer = SocketWriter::new(write_half);

    let timeout = ctx.config.server.request_timeout();
    let request = match tokio::time::timeout(timeout, read_request(&mut reader)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => {
            tracing::debug!(client = %session, "Connection closed before a request");
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!(client = %session, "Bad request: {e}");
            return;
        }
        Err(_) => {
            tracing::debug!(client = %session, "Timed out waiting for a request");
            return;
        }
    };

    let result = match request.operation {
        Operation::Stream => serve_stream(&ctx, &request, &writer, &session).await,
        Operation::FileName => serve_file_name(&ctx, &writer, &session).await,
        Operation::Log => serve_log(&ctx, &writer, &session).await,
        Operation::Reset => serve_reset(&ctx, &writer, &session).await,
    };

    match result {
        Ok(()) => {}
        Err(e) if e.is_disconnect() => {
            tracing::debug!(client = %session, "Client went away: {e}");
        }
        Err(e) => {
            tracing::warn!(client = %session, "Request failed: {e}");
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::trace!(client = %session, "Shutdown after reply failed: {e}");
    }
}

async fn serve_stream<W>(
    ctx: &ServerContext,
    request: &Request,
    writer: &SocketWriter<W>,
    session: &Arc<ClientSession>,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    tracing::info!(client = %session, "Request: video stream");

    let (active, current_len) = match locate_active(ctx).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(client = %session, "Nothing to stream: {e}");
            return write_reply(writer, ResponseHead::for_error(&e), b"").await;
        }
    };

    let offset = request
        .range_spec
        .as_deref()
        .map_or(0, |spec| parse_offset(spec, current_len));
    let growing = ctx.store.is_growing(&active.name);
    let size = if growing {
        ctx.config.streaming.growing_content_length
    } else {
        current_len
    };

    tracing::info!(
        client = %session,
        file = %active.name,
        offset,
        growing,
        "Streaming {} from {}",
        active.name,
        format_bytes(offset)
    );

    let head = ResponseHead::for_stream(content_type_for(&active.path), offset, size);
    writer.write_all(head.render().as_bytes()).await?;

    let streamer = TailStreamer::new(
        Arc::clone(&ctx.store) as Arc<dyn GrowthState>,
        TailConfig::from(&ctx.config.streaming),
        ctx.cancel.clone(),
    );
    let summary = streamer
        .stream(&active, offset, writer, writer, session.as_ref())
        .await?;

    let reason = match summary.outcome {
        TailOutcome::Complete => "file complete",
        TailOutcome::Truncated => "file truncated",
        TailOutcome::Stalled => "stream stopped",
        TailOutcome::PeerGone => "client disconnected",
        TailOutcome::Cancelled => "server shutting down",
    };
    tracing::info!(
        client = %session,
        outcome = ?summary.outcome,
        "Stats: sent: {}, average speed: {} ({reason})",
        format_bytes(summary.bytes_sent),
        format_speed(session.average_speed())
    );
    Ok(())
}

/// The active file and its current length.
async fn locate_active(ctx: &ServerContext) -> Result<(Arc<ActiveFile>, u64)> {
    let active = ctx
        .store
        .active_file()
        .ok_or_else(|| Error::not_found("active file", "recording directory"))?;
    match tokio::fs::metadata(&active.path).await {
        Ok(metadata) => Ok((active, metadata.len())),
        Err(e) => {
            tracing::debug!(file = %active.name, "Active file unreadable: {e}");
            Err(Error::not_found("recording", &active.name))
        }
    }
}

async fn serve_file_name<W>(
    ctx: &ServerContext,
    writer: &SocketWriter<W>,
    session: &ClientSession,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    tracing::info!(client = %session, "Request: latest file name");

    let name = match ctx.store.active_file() {
        Some(active) => {
            tracing::info!(client = %session, "=> {}", active.name);
            active.name.clone()
        }
        None => {
            tracing::warn!(client = %session, "No recordings found");
            String::new()
        }
    };
    write_text(writer, &name).await
}

async fn serve_log<W>(
    ctx: &ServerContext,
    writer: &SocketWriter<W>,
    session: &ClientSession,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    tracing::info!(client = %session, "Request: log output");

    let log = match &ctx.log {
        Some(provider) => provider.get_log(),
        None => "no log...".to_string(),
    };
    write_text(writer, &log).await
}

async fn serve_reset<W>(
    ctx: &ServerContext,
    writer: &SocketWriter<W>,
    session: &ClientSession,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    tracing::info!(client = %session, "Request: cache reset");
    ctx.store.request_reset();
    write_text(writer, "").await
}

async fn write_text<W>(writer: &SocketWriter<W>, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let head = ResponseHead::ok("text/plain").with_content_length(body.len() as u64);
    write_reply(writer, head, body.as_bytes()).await
}

async fn write_reply<W>(writer: &SocketWriter<W>, head: ResponseHead, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    writer.write_all(head.render().as_bytes()).await?;
    if !body.is_empty() {
        writer.write_all(body).await?;
    }
    writer.flush().await?;
    Ok(())
}
