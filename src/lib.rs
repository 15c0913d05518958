//! # Telemetry Relay
//!
//! Pushes point-in-time host metric snapshots from a client to a server over
//! an authenticated, encrypted TCP link, with automatic reconnect and backoff.
//!
//! - **Security**: every frame is sealed with XChaCha20-Poly1305 under a pre-shared key
//! - **Strictness**: payloads are decoded by a schema-checked parser, never evaluated
//! - **Resilience**: explicit session state machine; resets back off, other failures stop
//! - **Isolation**: one task per connection; one bad message never affects another
//!
//! ## Feature Flags
//!
//! - `client` (default): transport session and host metric collection
//! - `server` (default): dispatcher, SQLite store and link watchdog
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and collaborator traits (always included)
//! - [`crypto`]: pre-shared key and frame codec (always included)
//! - [`snapshot`]: snapshot model, strict codec and collector
//! - [`transport`]: length-delimited framing and request/reply links
//! - [`client`]: session state machine and client task (requires `client` feature)
//! - [`server`]: listener, dispatcher and storage (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use telemetry_relay::prelude::*;
//!
//! let codec = Codec::new(PresharedKey::generate());
//! let snapshot = MetricsSnapshot::unavailable();
//!
//! let text = snapshot.to_canonical_text().unwrap();
//! let frame = codec.encrypt(&text).unwrap();
//! let decoded = MetricsSnapshot::parse(&codec.decrypt(frame.as_bytes()).unwrap()).unwrap();
//!
//! assert_eq!(decoded, snapshot);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Security layer
pub mod crypto;

// Snapshot model and collection
pub mod snapshot;

// Transport layer
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::crypto::{Codec, EncryptedFrame, PresharedKey};
    pub use crate::snapshot::{MemoryUsage, MetricsSnapshot, NetConnection, TcpState};
    pub use crate::transport::{FramedLink, TransportError, TransportResult};

    #[cfg(feature = "client")]
    pub use crate::client::{
        ClientConfig, SessionEvent, SessionState, TelemetryClient, TelemetryClientBuilder,
    };
    #[cfg(feature = "client")]
    pub use crate::snapshot::SystemCollector;

    #[cfg(feature = "server")]
    pub use crate::server::{
        ServerConfig, ServerEvent, SnapshotStore, SqliteStore, TelemetryServer,
        TelemetryServerBuilder,
    };
}

// Re-export commonly used items at crate root
pub use core::{CodecError, MetricsSource, RelayError, SnapshotError};
pub use crypto::{Codec, PresharedKey};
pub use snapshot::MetricsSnapshot;
