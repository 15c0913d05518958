//! Per-message handling for accepted connections.
//!
//! For every inbound frame:
//!
//! 1. decrypt; on authentication failure report it and send nothing back
//! 2. parse with the strict snapshot decoder (non-UTF-8 plaintext is a parse
//!    failure)
//! 3. persist parsed snapshots on the blocking pool
//! 4. acknowledge every frame that decrypted, whatever the parse outcome
//!
//! Failures stay inside the connection they happened on.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::server::ServerEvent;
use super::session::{ConnectionId, ConnectionStats};
use super::store::{SnapshotStore, StoreError};
use super::watchdog::LinkWatchdog;
use crate::core::{ACK_TEXT, CodecError};
use crate::crypto::Codec;
use crate::snapshot::MetricsSnapshot;
use crate::transport::{FramedLink, TransportError, TransportResult};

/// Shared per-message pipeline. Cheap to clone; one clone per connection task.
#[derive(Clone)]
pub struct Dispatcher {
    codec: Codec,
    store: Arc<dyn SnapshotStore>,
    watchdog: Arc<LinkWatchdog>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("watchdog", &self.watchdog)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Assemble a dispatcher.
    pub fn new(
        codec: Codec,
        store: Arc<dyn SnapshotStore>,
        watchdog: Arc<LinkWatchdog>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            codec,
            store,
            watchdog,
            events,
        }
    }

    /// Codec used for every connection.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    /// Handle one frame. Returns the reply text, or `None` when the frame did
    /// not decrypt and must go unanswered.
    pub async fn handle_frame(
        &self,
        id: ConnectionId,
        stats: &mut ConnectionStats,
        frame: &[u8],
    ) -> Option<&'static str> {
        stats.touch();

        let text = match self.codec.decrypt(frame) {
            Ok(text) => text,
            // Authenticated under our key, so only the payload is bad.
            Err(CodecError::InvalidUtf8) => {
                self.watchdog.touch();
                self.reject(id, stats, "", CodecError::InvalidUtf8.to_string());
                return Some(ACK_TEXT);
            }
            Err(e) => {
                stats.auth_failures += 1;
                warn!(conn = %id, error = %e, "dropping frame that failed decryption");
                self.emit(ServerEvent::AuthenticationFailed { id, error: e });
                return None;
            }
        };
        self.watchdog.touch();
        debug!(conn = %id, bytes = text.len(), "frame decrypted");

        match MetricsSnapshot::parse(&text) {
            Ok(snapshot) => self.persist(id, stats, snapshot).await,
            Err(e) => self.reject(id, stats, &text, e.to_string()),
        }

        Some(ACK_TEXT)
    }

    fn reject(&self, id: ConnectionId, stats: &mut ConnectionStats, raw: &str, reason: String) {
        stats.parse_failures += 1;
        warn!(conn = %id, error = %reason, "payload rejected");
        self.store.on_parse_error(raw, &reason);
        self.emit(ServerEvent::ParseFailed { id, reason });
    }

    async fn persist(
        &self,
        id: ConnectionId,
        stats: &mut ConnectionStats,
        snapshot: MetricsSnapshot,
    ) {
        let store = Arc::clone(&self.store);
        let stored = {
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || store.on_parsed(&snapshot))
                .await
                .unwrap_or_else(|e| Err(StoreError::Worker(e.to_string())))
        };

        match stored {
            Ok(row_id) => {
                stats.stored += 1;
                debug!(conn = %id, row_id, "snapshot stored");
                self.emit(ServerEvent::SnapshotStored {
                    id,
                    row_id,
                    snapshot,
                });
            }
            Err(e) => {
                stats.persist_failures += 1;
                error!(conn = %id, error = %e, "failed to persist snapshot");
                self.emit(ServerEvent::PersistenceFailed {
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Serve one connection until the peer leaves or the link fails.
    pub async fn serve<S>(
        &self,
        id: ConnectionId,
        mut link: FramedLink<S>,
        mut stats: ConnectionStats,
    ) -> ConnectionStats
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(conn = %id, peer = %stats.peer(), "client connected");
        self.emit(ServerEvent::ClientConnected {
            id,
            peer: stats.peer(),
        });

        match self.pump(id, &mut link, &mut stats).await {
            Err(TransportError::ConnectionClosed) => {
                info!(conn = %id, frames = stats.frames, "client disconnected");
            }
            Err(e) => {
                warn!(conn = %id, frames = stats.frames, error = %e, "connection dropped");
            }
            Ok(()) => {}
        }
        self.emit(ServerEvent::ClientDisconnected {
            id,
            stats: stats.clone(),
        });
        stats
    }

    async fn pump<S>(
        &self,
        id: ConnectionId,
        link: &mut FramedLink<S>,
        stats: &mut ConnectionStats,
    ) -> TransportResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let frame = link.recv_frame().await?;
            if let Some(reply) = self.handle_frame(id, stats, &frame).await {
                link.send_text(reply).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use super::*;
    use crate::core::{AEAD_NONCE_SIZE, KEY_SIZE};
    use crate::crypto::PresharedKey;
    use crate::server::SqliteStore;

    const REFERENCE: &str = r#"{"timestamp":"2024-01-01 00:00:00","ram":{"total":16.0,"used":8.0,"percent":50.0},"network":[]}"#;

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn on_parsed(&self, _: &MetricsSnapshot) -> Result<i64, StoreError> {
            Err(StoreError::Worker("disk full".into()))
        }

        fn record_emergency(&self, _: &str) -> Result<i64, StoreError> {
            Err(StoreError::Worker("disk full".into()))
        }
    }

    fn codec(byte: u8) -> Codec {
        Codec::new(PresharedKey::from_bytes([byte; KEY_SIZE]))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn dispatcher(
        store: Arc<dyn SnapshotStore>,
    ) -> (Dispatcher, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dog = Arc::new(LinkWatchdog::new(Duration::from_secs(30)));
        (Dispatcher::new(codec(1), store, dog, tx), rx)
    }

    #[tokio::test]
    async fn test_valid_snapshot_is_stored_and_acked() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (dispatcher, mut events) = dispatcher(store.clone());
        let mut stats = ConnectionStats::new(peer());
        let id = ConnectionId::new(1);

        let frame = codec(1).encrypt(REFERENCE).unwrap();
        let reply = dispatcher.handle_frame(id, &mut stats, frame.as_bytes()).await;

        assert_eq!(reply, Some(ACK_TEXT));
        assert_eq!(stats.stored, 1);
        let records = store.recent_records(1).unwrap();
        assert_eq!(records[0].ram_percent, 50.0);
        assert!(matches!(
            events.try_recv().unwrap(),
            ServerEvent::SnapshotStored { row_id, .. } if row_id == records[0].id
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_gets_no_reply() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (dispatcher, mut events) = dispatcher(store.clone());
        let mut stats = ConnectionStats::new(peer());

        let frame = codec(2).encrypt(REFERENCE).unwrap();
        let reply = dispatcher
            .handle_frame(ConnectionId::new(1), &mut stats, frame.as_bytes())
            .await;

        assert_eq!(reply, None);
        assert_eq!(stats.auth_failures, 1);
        assert_eq!(store.snapshot_count().unwrap(), 0);
        assert!(matches!(
            events.try_recv().unwrap(),
            ServerEvent::AuthenticationFailed {
                error: CodecError::AuthenticationFailed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unparseable_payload_still_acked() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (dispatcher, mut events) = dispatcher(store.clone());
        let mut stats = ConnectionStats::new(peer());

        let frame = codec(1).encrypt("__import__('os').system('id')").unwrap();
        let reply = dispatcher
            .handle_frame(ConnectionId::new(1), &mut stats, frame.as_bytes())
            .await;

        assert_eq!(reply, Some(ACK_TEXT));
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(store.snapshot_count().unwrap(), 0);
        assert!(matches!(events.try_recv().unwrap(), ServerEvent::ParseFailed { .. }));
    }

    #[tokio::test]
    async fn test_non_utf8_plaintext_is_a_parse_failure() {
        use chacha20poly1305::{
            XChaCha20Poly1305, XNonce,
            aead::{Aead, KeyInit},
        };

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (dispatcher, mut events) = dispatcher(store.clone());
        let mut stats = ConnectionStats::new(peer());

        let nonce = [9u8; AEAD_NONCE_SIZE];
        let key = [1u8; KEY_SIZE];
        let cipher = XChaCha20Poly1305::new((&key).into());
        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), &[0xff, 0xfe, 0x80][..])
            .unwrap();
        let frame = [nonce.as_slice(), sealed.as_slice()].concat();

        let reply = dispatcher
            .handle_frame(ConnectionId::new(1), &mut stats, &frame)
            .await;

        assert_eq!(reply, Some(ACK_TEXT));
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.auth_failures, 0);
        assert_eq!(store.snapshot_count().unwrap(), 0);
        assert!(matches!(
            events.try_recv().unwrap(),
            ServerEvent::ParseFailed { reason, .. } if reason.contains("UTF-8")
        ));
    }

    #[tokio::test]
    async fn test_store_failure_still_acked() {
        let (dispatcher, mut events) = dispatcher(Arc::new(FailingStore));
        let mut stats = ConnectionStats::new(peer());

        let frame = codec(1).encrypt(REFERENCE).unwrap();
        let reply = dispatcher
            .handle_frame(ConnectionId::new(1), &mut stats, frame.as_bytes())
            .await;

        assert_eq!(reply, Some(ACK_TEXT));
        assert_eq!(stats.persist_failures, 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            ServerEvent::PersistenceFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_serve_survives_bad_frames() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (dispatcher, mut events) = dispatcher(store.clone());
        let (a, b) = tokio::io::duplex(8192);

        let server = tokio::spawn(async move {
            let link = FramedLink::new(b, codec(1));
            dispatcher
                .serve(ConnectionId::new(7), link, ConnectionStats::new(peer()))
                .await
        });

        let mut client = FramedLink::new(a, codec(1));
        client.send_frame(&[0u8; 64]).await.unwrap();
        client.send_text("not a snapshot").await.unwrap();
        assert_eq!(client.recv_text().await.unwrap(), ACK_TEXT);
        client.send_text(REFERENCE).await.unwrap();
        assert_eq!(client.recv_text().await.unwrap(), ACK_TEXT);
        drop(client);

        let stats = server.await.unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.auth_failures, 1);
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.stored, 1);
        assert_eq!(store.snapshot_count().unwrap(), 1);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 5);
        assert!(matches!(seen[0], ServerEvent::ClientConnected { .. }));
        assert!(matches!(seen[1], ServerEvent::AuthenticationFailed { .. }));
        assert!(matches!(seen[2], ServerEvent::ParseFailed { .. }));
        assert!(matches!(seen[3], ServerEvent::SnapshotStored { .. }));
        assert!(matches!(
            &seen[4],
            ServerEvent::ClientDisconnected { stats, .. } if stats.frames == 3
        ));
    }
}
