//! Per-connection bookkeeping.
//!
//! Tracks one accepted connection: its id, peer address, and message counters
//! for the disconnect report.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server-assigned connection id, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source.
#[derive(Debug)]
pub struct ConnectionIds {
    next: AtomicU64,
}

impl Default for ConnectionIds {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionIds {
    /// Start at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Counters for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    peer: SocketAddr,
    connected_at: Instant,
    last_activity: Instant,

    /// Frames read off the socket.
    pub frames: u64,
    /// Snapshots written to the store.
    pub stored: u64,
    /// Decrypted payloads that failed to parse.
    pub parse_failures: u64,
    /// Frames that failed decryption.
    pub auth_failures: u64,
    /// Snapshots the store rejected.
    pub persist_failures: u64,
}

impl ConnectionStats {
    /// Fresh counters for `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            peer,
            connected_at: now,
            last_activity: now,
            frames: 0,
            stored: 0,
            parse_failures: 0,
            auth_failures: 0,
            persist_failures: 0,
        }
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Record an inbound frame.
    pub fn touch(&mut self) {
        self.frames += 1;
        self.last_activity = Instant::now();
    }

    /// Time since the last inbound frame.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
