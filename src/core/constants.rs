//! Protocol and runtime constants.
//!
//! Wire-level values are fixed by the relay protocol. Timing values are the
//! defaults used by [`ClientConfig`](crate::client::ClientConfig) and
//! [`ServerConfig`](crate::server::ServerConfig) and can be overridden there.

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Pre-shared key size (XChaCha20-Poly1305).
pub const KEY_SIZE: usize = 32;

/// XChaCha20 nonce size. Every frame carries its own random nonce.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Smallest frame that can possibly authenticate (nonce + empty ciphertext + tag).
pub const MIN_FRAME_SIZE: usize = AEAD_NONCE_SIZE + AEAD_TAG_SIZE;

// =============================================================================
// FRAMING
// =============================================================================

/// Length prefix size (u32, big-endian).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame body accepted from a peer.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

// =============================================================================
// SNAPSHOT ENCODING
// =============================================================================

/// Maximum number of network connections carried in one snapshot.
pub const MAX_CONNECTIONS: usize = 5;

/// Timestamp layout used on the wire and in storage (second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sentinel for a connection without a remote endpoint.
pub const SENTINEL_NO_REMOTE: &str = "N/A";

/// Bytes per reported memory unit (GiB).
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Acknowledgement text sent back for every decrypted message.
pub const ACK_TEXT: &str = "received";

// =============================================================================
// NETWORK DEFAULTS
// =============================================================================

/// Default server port.
pub const DEFAULT_PORT: u16 = 12345;

/// Default server bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:12345";

/// Default client target.
pub const DEFAULT_SERVER_URL: &str = "tcp://127.0.0.1:12345";

// =============================================================================
// TIMING
// =============================================================================

/// Delay between acknowledged snapshots.
pub const COLLECT_INTERVAL: Duration = Duration::from_secs(2);

/// Delay before retrying after a failed connect or a peer reset.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Upper bound on the wait for an acknowledgement.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between tearing down a link and reconnecting on request.
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Silence after which the server records an emergency trigger.
pub const EMERGENCY_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the link watchdog checks for silence.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);
