//! Minimal HTTP/1.0 request reader and response heads.
//!
//! Only the request line and the `Range` header are interpreted. Replies
//! always close the connection.

use std::fmt::Write as _;
use std::path::Path;

use tailcast_common::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::range::range_spec_from_header;

/// Upper bound on the request line plus headers.
pub const MAX_HEADER_BYTES: usize = 8192;

pub const SERVER_NAME: &str = concat!("tailcast/", env!("CARGO_PKG_VERSION"));

/// What the client asked for, from the first path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Anything not listed below: stream the active file.
    Stream,
    /// `file`: name of the active file.
    FileName,
    /// `log`: the captured log.
    Log,
    /// `reset`: forget all tracked files.
    Reset,
}

impl Operation {
    pub fn from_path(path: &str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);
        let path = path.split(['?', '#']).next().unwrap_or_default();
        match path.split('/').next().unwrap_or_default() {
            "file" => Operation::FileName,
            "log" => Operation::Log,
            "reset" => Operation::Reset,
            _ => Operation::Stream,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    /// Start spec from a `Range: bytes=<spec>-` header.
    pub range_spec: Option<String>,
}

/// Path token of a request line: the second word, or the whole line when it
/// has no space.
fn request_path(line: &str) -> &str {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some(_method), Some(path)) => path,
        (Some(only), None) => only,
        _ => "",
    }
}

/// Read a request up to the blank line that ends its headers.
///
/// Returns `Ok(None)` when the peer closes the connection before sending a
/// request line. End of input after the request line ends the headers.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut total = 0usize;
    let mut request: Option<Request> = None;

    loop {
        line.clear();
        // One byte past the budget is enough to detect an overrun.
        let budget = (MAX_HEADER_BYTES - total + 1) as u64;
        let n = (&mut *reader)
            .take(budget)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Ok(request);
        }

        total += n;
        if total > MAX_HEADER_BYTES {
            return Err(Error::protocol("request headers too large"));
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\r', '\n']);

        let Some(current) = request.as_mut() else {
            // Tolerate blank lines before the request line.
            if text.trim().is_empty() {
                continue;
            }
            request = Some(Request {
                operation: Operation::from_path(request_path(text)),
                range_spec: None,
            });
            continue;
        };

        if text.is_empty() {
            return Ok(request);
        }

        if let Some((name, value)) = text.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                current.range_spec = range_spec_from_header(value.trim()).map(str::to_string);
            }
        }
    }
}

/// Content type of a streamed file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "flv" => "video/x-flv",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "ts" => "video/mp2t",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Status line plus headers of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    /// `(start, end, total)` for `Content-Range: start-end/total`.
    pub content_range: Option<(u64, u64, u64)>,
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn ok(content_type: &'static str) -> Self {
        Self {
            status: 200,
            reason: "Ok",
            content_type,
            content_range: None,
            content_length: None,
        }
    }

    pub fn partial(content_type: &'static str) -> Self {
        Self {
            status: 206,
            reason: "Partial Content",
            ..Self::ok(content_type)
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            reason: "Not Found",
            ..Self::ok("text/plain")
        }
    }

    /// Head for a request that failed before anything was sent.
    pub fn for_error(err: &Error) -> Self {
        match err.http_status() {
            404 => Self::not_found(),
            400 => Self {
                status: 400,
                reason: "Bad Request",
                ..Self::ok("text/plain")
            },
            status => Self {
                status,
                reason: "Internal Server Error",
                ..Self::ok("text/plain")
            },
        }
    }

    /// Head for streaming `size` bytes of which the client asked for the
    /// tail starting at `offset`.
    ///
    /// A non-zero offset yields `206` with `Content-Range`, otherwise `200`.
    pub fn for_stream(content_type: &'static str, offset: u64, size: u64) -> Self {
        if offset > 0 {
            Self {
                content_range: Some((offset, size.saturating_sub(1), size)),
                content_length: Some(size.saturating_sub(offset)),
                ..Self::partial(content_type)
            }
        } else {
            Self {
                content_length: Some(size),
                ..Self::ok(content_type)
            }
        }
    }

    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    pub fn render(&self) -> String {
        let mut head = String::with_capacity(160);
        // Writing into a String cannot fail.
        let _ = write!(head, "HTTP/1.0 {} {}\r\n", self.status, self.reason);
        let _ = write!(head, "Server: {SERVER_NAME}\r\nConnection: close\r\n");
        let _ = write!(head, "Content-Type: {}\r\n", self.content_type);
        if let Some((start, end, total)) = self.content_range {
            let _ = write!(head, "Content-Range: {start}-{end}/{total}\r\n");
        }
        if let Some(len) = self.content_length {
            let _ = write!(head, "Content-Length: {len}\r\n");
        }
        head.push_str("\r\n");
        head
    }
}
