//! Metrics snapshots
//!
//! - [`MetricsSnapshot`]: the immutable value sent once per tick
//! - canonical text encoding and its strict parser
//! - [`SystemCollector`]: the host-backed [`MetricsSource`](crate::core::MetricsSource)
//!   (requires the `client` feature)

#[cfg(feature = "client")]
mod collector;
mod model;
pub mod procnet;

#[cfg(feature = "client")]
pub use collector::SystemCollector;
pub use model::{MemoryUsage, MetricsSnapshot, NetConnection, TcpState};
