//! Transport layer
//!
//! - **Framing**: [`write_frame`] / [`read_frame`], length-delimited frames over TCP
//! - **Links**: [`FramedLink`], an encrypted request/reply channel owning its socket
//! - **Errors**: [`TransportError`] with reset/other classification
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Session (client) / Dispatcher (server)│
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │     framing, request/reply, errors      │
//! ├─────────────────────────────────────────┤
//! │         Security Layer (Codec)          │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod error;
mod frame;

pub use connection::FramedLink;
pub use error::*;
pub use frame::{read_frame, write_frame};
