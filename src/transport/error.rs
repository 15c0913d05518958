//! Transport layer error types.
//!
//! Errors are classified once, here, so the session loop only has to ask
//! [`TransportError::is_reset`] to pick between backing off and stopping.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::core::{CodecError, SnapshotError};

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer forcibly closed the connection (reset, abort, broken pipe).
    #[error("connection reset by peer: {0}")]
    ConnectionReset(#[source] io::Error),

    /// Peer closed the stream cleanly between frames.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Any other socket failure.
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    /// No reply arrived within the configured window.
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    /// Length prefix exceeds the accepted maximum.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced or attempted length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// Reply failed authentication or decoding.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Outbound snapshot could not be encoded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl TransportError {
    /// Classify an I/O error.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::ConnectionReset(err),
            _ => TransportError::Io(err),
        }
    }

    /// Whether the peer went away in a way that warrants backoff and retry.
    ///
    /// Everything else stops the session until a reconnect is requested.
    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionReset(_)
                | TransportError::ConnectionClosed
                | TransportError::ReplyTimeout(_)
        )
    }

    /// Whether the error came from the security layer.
    pub fn is_security_error(&self) -> bool {
        matches!(self, TransportError::Codec(_))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
