//! Telemetry server
//!
//! - [`TelemetryServer`]: TCP listener, one task per connection
//! - [`Dispatcher`]: decrypt, parse, persist, acknowledge
//! - [`SqliteStore`]: append-only snapshot storage
//! - [`LinkWatchdog`]: emergency on prolonged client silence

mod dispatcher;
#[allow(clippy::module_inception)]
mod server;
mod session;
mod store;
mod watchdog;

pub use dispatcher::Dispatcher;
pub use server::*;
pub use session::*;
pub use store::*;
pub use watchdog::*;
