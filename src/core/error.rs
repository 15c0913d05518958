//! Error types shared across the relay.

use thiserror::Error;

/// Errors from the frame codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame failed its integrity check (tampered, wrong key, or not ciphertext).
    #[error("frame authentication failed")]
    AuthenticationFailed,

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Authenticated plaintext was not valid UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    /// Key material could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Errors raised while validating or decoding a metrics snapshot.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    /// Text does not match the snapshot schema.
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// A numeric field is outside its allowed range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name (wire key).
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// More connections than a snapshot may carry.
    #[error("too many connections: {count} (max {max})")]
    TooManyConnections {
        /// Number of entries received.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },
}

/// Top-level relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Snapshot error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
