//! High-level telemetry server API.
//!
//! [`TelemetryServer`] accepts TCP connections, runs one task per connection
//! through the [`Dispatcher`], and a watchdog task that raises an emergency
//! when clients go quiet. Everything observable is reported as a
//! [`ServerEvent`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use super::session::{ConnectionId, ConnectionIds, ConnectionStats};
use super::store::SnapshotStore;
use super::watchdog::LinkWatchdog;
use crate::core::{CodecError, DEFAULT_PORT, EMERGENCY_TIMEOUT, MAX_FRAME_SIZE, WATCHDOG_INTERVAL};
use crate::crypto::Codec;
use crate::snapshot::MetricsSnapshot;
use crate::transport::FramedLink;

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Errors that can occur in the telemetry server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// Client silence that raises an emergency.
    pub emergency_timeout: Duration,

    /// How often the watchdog checks for silence.
    pub watchdog_interval: Duration,

    /// Largest accepted frame body.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            emergency_timeout: EMERGENCY_TIMEOUT,
            watchdog_interval: WATCHDOG_INTERVAL,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Builder for creating a [`ServerConfig`].
#[derive(Debug, Default)]
pub struct TelemetryServerBuilder {
    config: ServerConfig,
}

impl TelemetryServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the emergency timeout.
    pub fn emergency_timeout(mut self, timeout: Duration) -> Self {
        self.config.emergency_timeout = timeout;
        self
    }

    /// Set the watchdog poll interval. Values below
    /// [`MIN_WATCHDOG_INTERVAL`](super::MIN_WATCHDOG_INTERVAL) are raised to it.
    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.config.watchdog_interval = interval;
        self
    }

    /// Set the frame size limit.
    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.config.max_frame_size = max;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Event from the server.
#[derive(Debug)]
pub enum ServerEvent {
    /// A new client has connected.
    ClientConnected {
        /// Connection id.
        id: ConnectionId,
        /// Remote address.
        peer: SocketAddr,
    },

    /// A snapshot was parsed and stored.
    SnapshotStored {
        /// Connection id.
        id: ConnectionId,
        /// Row id in `system_data`.
        row_id: i64,
        /// The stored snapshot.
        snapshot: MetricsSnapshot,
    },

    /// A decrypted payload was not a valid snapshot.
    ParseFailed {
        /// Connection id.
        id: ConnectionId,
        /// Parser message.
        reason: String,
    },

    /// A frame failed decryption and was dropped unanswered.
    AuthenticationFailed {
        /// Connection id.
        id: ConnectionId,
        /// Codec failure.
        error: CodecError,
    },

    /// A parsed snapshot could not be stored.
    PersistenceFailed {
        /// Connection id.
        id: ConnectionId,
        /// Storage failure.
        error: String,
    },

    /// A client has disconnected.
    ClientDisconnected {
        /// Connection id.
        id: ConnectionId,
        /// Final counters.
        stats: ConnectionStats,
    },

    /// Clients have been silent for the emergency timeout.
    EmergencyTriggered {
        /// Row id in `emergency_trigger`, if the write succeeded.
        row_id: Option<i64>,
        /// Silence observed when the watchdog tripped.
        silent_for: Duration,
    },
}

/// A telemetry relay server.
///
/// # Example
///
/// ```ignore
/// use telemetry_relay::server::{SqliteStore, TelemetryServer, TelemetryServerBuilder};
///
/// let config = TelemetryServerBuilder::new()
///     .bind_addr("0.0.0.0:12345".parse()?)
///     .build();
/// let store = Arc::new(SqliteStore::open("relay.db")?);
///
/// let (server, mut events) = TelemetryServer::bind(config, codec, store).await?;
/// tokio::spawn(server.run());
///
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// ```
pub struct TelemetryServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Dispatcher,
    watchdog: Arc<LinkWatchdog>,
    store: Arc<dyn SnapshotStore>,
    events: mpsc::UnboundedSender<ServerEvent>,
    ids: ConnectionIds,
}

impl TelemetryServer {
    /// Bind the listening socket.
    ///
    /// Returns the server and the receiving end of its event channel. Nothing
    /// is accepted until [`run`](Self::run) is polled.
    pub async fn bind(
        config: ServerConfig,
        codec: Codec,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), ServerError> {
        let listener =
            TcpListener::bind(config.bind_addr)
                .await
                .map_err(|source| ServerError::BindFailed {
                    addr: config.bind_addr,
                    source,
                })?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let watchdog = Arc::new(LinkWatchdog::new(config.emergency_timeout));
        let dispatcher = Dispatcher::new(
            codec,
            Arc::clone(&store),
            Arc::clone(&watchdog),
            events_tx.clone(),
        );

        info!(addr = %local_addr, "telemetry server listening");
        let server = Self {
            config,
            listener,
            local_addr,
            dispatcher,
            watchdog,
            store,
            events: events_tx,
            ids: ConnectionIds::new(),
        };
        Ok((server, events_rx))
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then abort every connection task.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        let watchdog = tokio::spawn(Arc::clone(&self.watchdog).run(
            self.config.watchdog_interval,
            Arc::clone(&self.store),
            self.events.clone(),
        ));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "set_nodelay failed");
                        }
                        let id = self.ids.next_id();
                        let link = FramedLink::new(stream, self.dispatcher.codec().clone())
                            .with_max_frame_size(self.config.max_frame_size);
                        let dispatcher = self.dispatcher.clone();
                        tasks.spawn(async move {
                            dispatcher.serve(id, link, ConnectionStats::new(peer)).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "connection task ended abnormally");
                    }
                }
            }
        }

        info!(addr = %self.local_addr, active = tasks.len(), "telemetry server stopping");
        watchdog.abort();
        tasks.shutdown().await;
    }
}
