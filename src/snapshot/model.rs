//! Metrics snapshot model and its canonical text encoding.
//!
//! Canonical text is compact JSON with a fixed key order:
//!
//! ```text
//! {"timestamp":"2024-01-01 00:00:00",
//!  "ram":{"total":16.0,"used":8.0,"percent":50.0},
//!  "network":[{"local_addr":"10.0.0.2:50522","remote_addr":"93.184.216.34:443","status":"ESTABLISHED"}]}
//! ```
//!
//! Decoding is strict. Unknown keys, wrong types, out-of-range numbers,
//! unparseable addresses and unknown TCP states are all rejected, so whatever
//! a peer sends is only ever treated as data.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::core::{
    BYTES_PER_GB, MAX_CONNECTIONS, SENTINEL_NO_REMOTE, SnapshotError, TIMESTAMP_FORMAT,
};

/// TCP connection state, named as in `netstat` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpState {
    /// Connection open, data flowing.
    Established,
    /// Active open sent.
    SynSent,
    /// Passive open received.
    SynRecv,
    /// Local close, waiting for peer ack.
    FinWait1,
    /// Local close acked, waiting for peer FIN.
    FinWait2,
    /// Waiting out 2*MSL.
    TimeWait,
    /// Closed.
    Close,
    /// Peer closed, waiting for local close.
    CloseWait,
    /// Local close after peer close.
    LastAck,
    /// Listening socket.
    Listen,
    /// Both sides closing.
    Closing,
}

impl TcpState {
    /// Map a Linux `/proc/net/tcp` `st` code.
    pub fn from_proc_code(code: u8) -> Option<Self> {
        let state = match code {
            0x01 => Self::Established,
            0x02 => Self::SynSent,
            0x03 => Self::SynRecv,
            0x04 => Self::FinWait1,
            0x05 => Self::FinWait2,
            0x06 => Self::TimeWait,
            0x07 => Self::Close,
            0x08 => Self::CloseWait,
            0x09 => Self::LastAck,
            0x0A => Self::Listen,
            0x0B => Self::Closing,
            _ => return None,
        };
        Some(state)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Established => "ESTABLISHED",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::FinWait1 => "FIN_WAIT1",
            Self::FinWait2 => "FIN_WAIT2",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TcpState {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        (0x01..=0x0B)
            .filter_map(Self::from_proc_code)
            .find(|state| state.as_str() == s)
            .ok_or_else(|| SnapshotError::Malformed(format!("unknown connection status {s:?}")))
    }
}

/// One network connection entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConnection {
    /// Local endpoint.
    pub local_addr: SocketAddr,
    /// Remote endpoint, if the socket has one.
    pub remote_addr: Option<SocketAddr>,
    /// TCP state.
    pub status: TcpState,
}

/// Host memory usage in GiB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    total: f64,
    used: f64,
    percent: f64,
}

impl MemoryUsage {
    /// Build from GiB figures, validating ranges.
    pub fn new(total: f64, used: f64, percent: f64) -> Result<Self, SnapshotError> {
        check_magnitude("ram.total", total)?;
        check_magnitude("ram.used", used)?;
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(SnapshotError::OutOfRange {
                field: "ram.percent",
                value: percent,
            });
        }
        Ok(Self {
            total,
            used,
            percent,
        })
    }

    /// Build from raw byte counters: GiB rounded to two decimals, percent to one.
    ///
    /// A zero total yields all-zero figures (the "unavailable" sentinel).
    pub fn from_bytes(total_bytes: u64, used_bytes: u64) -> Self {
        if total_bytes == 0 {
            return Self::unavailable();
        }
        let used_bytes = used_bytes.min(total_bytes);
        let percent = used_bytes as f64 / total_bytes as f64 * 100.0;
        Self {
            total: round_to(total_bytes as f64 / BYTES_PER_GB, 2),
            used: round_to(used_bytes as f64 / BYTES_PER_GB, 2),
            percent: round_to(percent, 1).clamp(0.0, 100.0),
        }
    }

    /// Sentinel for hosts where memory counters cannot be read.
    pub fn unavailable() -> Self {
        Self {
            total: 0.0,
            used: 0.0,
            percent: 0.0,
        }
    }

    /// Total memory (GiB).
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Used memory (GiB).
    pub fn used(&self) -> f64 {
        self.used
    }

    /// Used share, 0–100.
    pub fn percent(&self) -> f64 {
        self.percent
    }
}

/// A point-in-time bundle of host metrics.
///
/// Immutable once built; the constructor enforces the connection cap and the
/// memory ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    timestamp: NaiveDateTime,
    memory: MemoryUsage,
    connections: Vec<NetConnection>,
}

impl MetricsSnapshot {
    /// Build a snapshot. Sub-second precision is dropped from `timestamp`.
    pub fn new(
        timestamp: NaiveDateTime,
        memory: MemoryUsage,
        connections: Vec<NetConnection>,
    ) -> Result<Self, SnapshotError> {
        if connections.len() > MAX_CONNECTIONS {
            return Err(SnapshotError::TooManyConnections {
                count: connections.len(),
                max: MAX_CONNECTIONS,
            });
        }
        Ok(Self {
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            memory,
            connections,
        })
    }

    /// Snapshot with every metric at its sentinel, stamped now.
    pub fn unavailable() -> Self {
        Self {
            timestamp: now_seconds(),
            memory: MemoryUsage::unavailable(),
            connections: Vec::new(),
        }
    }

    /// Collection time.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Collection time in wire format.
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Memory figures.
    pub fn memory(&self) -> &MemoryUsage {
        &self.memory
    }

    /// Connection entries, in collection order.
    pub fn connections(&self) -> &[NetConnection] {
        &self.connections
    }

    /// Encode as canonical text.
    pub fn to_canonical_text(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(&WireSnapshot::from(self))
            .map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    /// Encode only the `network` list, for storage.
    pub fn connections_text(&self) -> Result<String, SnapshotError> {
        let network: Vec<WireConnection> =
            self.connections.iter().map(WireConnection::from).collect();
        serde_json::to_string(&network).map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    /// Strictly decode canonical text.
    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        let wire: WireSnapshot =
            serde_json::from_str(text).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        Self::try_from(wire)
    }
}

impl FromStr for MetricsSnapshot {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Current local time truncated to whole seconds.
pub(crate) fn now_seconds() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn check_magnitude(field: &'static str, value: f64) -> Result<(), SnapshotError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SnapshotError::OutOfRange { field, value })
    }
}

fn parse_endpoint(field: &str, text: &str) -> Result<SocketAddr, SnapshotError> {
    text.parse()
        .map_err(|_| SnapshotError::Malformed(format!("{field} is not a socket address: {text:?}")))
}

// =============================================================================
// WIRE SHAPES
// =============================================================================

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireSnapshot {
    timestamp: String,
    ram: WireRam,
    network: Vec<WireConnection>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireRam {
    total: f64,
    used: f64,
    percent: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireConnection {
    local_addr: String,
    remote_addr: String,
    status: String,
}

impl From<&NetConnection> for WireConnection {
    fn from(conn: &NetConnection) -> Self {
        Self {
            local_addr: conn.local_addr.to_string(),
            remote_addr: conn
                .remote_addr
                .map_or_else(|| SENTINEL_NO_REMOTE.to_string(), |addr| addr.to_string()),
            status: conn.status.as_str().to_string(),
        }
    }
}

impl TryFrom<WireConnection> for NetConnection {
    type Error = SnapshotError;

    fn try_from(wire: WireConnection) -> Result<Self, Self::Error> {
        let local_addr = parse_endpoint("local_addr", &wire.local_addr)?;
        let remote_addr = if wire.remote_addr == SENTINEL_NO_REMOTE {
            None
        } else {
            Some(parse_endpoint("remote_addr", &wire.remote_addr)?)
        };
        let status = wire.status.parse()?;
        Ok(Self {
            local_addr,
            remote_addr,
            status,
        })
    }
}

impl From<&MetricsSnapshot> for WireSnapshot {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp_text(),
            ram: WireRam {
                total: snapshot.memory.total,
                used: snapshot.memory.used,
                percent: snapshot.memory.percent,
            },
            network: snapshot
                .connections
                .iter()
                .map(WireConnection::from)
                .collect(),
        }
    }
}

impl TryFrom<WireSnapshot> for MetricsSnapshot {
    type Error = SnapshotError;

    fn try_from(wire: WireSnapshot) -> Result<Self, Self::Error> {
        let timestamp = NaiveDateTime::parse_from_str(&wire.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| {
                SnapshotError::Malformed(format!("timestamp {:?}: {e}", wire.timestamp))
            })?;

        let memory = MemoryUsage::new(wire.ram.total, wire.ram.used, wire.ram.percent)?;

        if wire.network.len() > MAX_CONNECTIONS {
            return Err(SnapshotError::TooManyConnections {
                count: wire.network.len(),
                max: MAX_CONNECTIONS,
            });
        }
        let connections = wire
            .network
            .into_iter()
            .map(NetConnection::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(timestamp, memory, connections)
    }
}
