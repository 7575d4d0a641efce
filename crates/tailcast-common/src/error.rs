//! Unified error type for tailcast.
//!
//! Per-connection failures are funnelled into [`Error`]. Before a response
//! head is sent the connection handler picks its status line from
//! [`Error::http_status`]; afterwards the error is only logged.

use std::fmt;

/// Unified error type covering the failure modes of the streaming server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found (e.g. no active file yet).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "active file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An I/O operation on a file or socket failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The client sent something that is not a request.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to the status code of the reply it produces.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Io { .. } => 500,
            Error::Protocol(_) => 400,
            Error::Validation(_) => 400,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    /// True when the error means the remote peer went away (broken pipe,
    /// reset, aborted). Such errors end a stream but are not failures.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io { source } => is_disconnect_kind(source.kind()),
            _ => false,
        }
    }
}

/// I/O error kinds that indicate the peer closed the connection.
pub fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof
    )
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
