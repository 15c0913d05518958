//! Telemetry client
//!
//! - [`SessionMachine`]: pure connection state machine
//! - [`TelemetryClient`]: session task that pumps snapshots to the server

#[allow(clippy::module_inception)]
mod client;
mod session;

pub use client::*;
pub use session::*;
