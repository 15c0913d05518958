//! Snapshot persistence.
//!
//! [`SnapshotStore`] is the seam between the dispatcher and storage. The
//! shipped implementation, [`SqliteStore`], appends to a local SQLite file
//! through a single mutex-guarded connection, so writes are serialized.
//!
//! Store calls are blocking; the dispatcher runs them on the blocking pool.

use std::path::Path;

use chrono::Local;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::{SnapshotError, TIMESTAMP_FORMAT};
use crate::snapshot::MetricsSnapshot;

const SCHEMA_VERSION: i64 = 1;

/// Text recorded in `emergency_trigger.status` for a new trigger.
pub const EMERGENCY_STATUS_ACTIVE: &str = "active";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot could not be encoded for storage.
    #[error("encode error: {0}")]
    Encode(#[from] SnapshotError),

    /// Database was written by a newer schema.
    #[error("database schema version {found} is newer than supported {supported}")]
    SchemaTooNew {
        /// Version in the file.
        found: i64,
        /// Version this build writes.
        supported: i64,
    },

    /// The blocking worker running the write died.
    #[error("storage worker failed: {0}")]
    Worker(String),
}

/// Persistence collaborator of the dispatcher.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Persist a parsed snapshot; returns the new row id.
    fn on_parsed(&self, snapshot: &MetricsSnapshot) -> Result<i64, StoreError>;

    /// A decrypted payload failed to parse. Nothing is persisted by default.
    fn on_parse_error(&self, raw: &str, reason: &str) {
        debug!(bytes = raw.len(), reason, "unparsed payload not persisted");
    }

    /// Append an emergency trigger; returns the new row id.
    fn record_emergency(&self, reason: &str) -> Result<i64, StoreError>;
}

/// One `system_data` row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Auto-increment id.
    pub id: i64,
    /// Snapshot timestamp, wire format.
    pub timestamp: String,
    /// Total memory, GB.
    pub ram_total: f64,
    /// Used memory, GB.
    pub ram_used: f64,
    /// Used memory, percent.
    pub ram_percent: f64,
    /// Connection list as canonical text.
    pub network_connections: String,
    /// Server-side receive time, wire format.
    pub received_at: String,
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        init_schema(&conn)?;
        info!(path = %path.display(), "snapshot store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of `system_data` rows.
    pub fn snapshot_count(&self) -> Result<u64, StoreError> {
        count(&self.conn.lock(), "system_data")
    }

    /// Number of `emergency_trigger` rows.
    pub fn emergency_count(&self) -> Result<u64, StoreError> {
        count(&self.conn.lock(), "emergency_trigger")
    }

    /// Most recent `system_data` rows, newest first.
    pub fn recent_records(&self, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, ram_total, ram_used, ram_percent, network_connections, received_at
             FROM system_data ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok(StoredRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                ram_total: row.get(2)?,
                ram_used: row.get(3)?,
                ram_percent: row.get(4)?,
                network_connections: row.get(5)?,
                received_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl SnapshotStore for SqliteStore {
    fn on_parsed(&self, snapshot: &MetricsSnapshot) -> Result<i64, StoreError> {
        let network = snapshot.connections_text()?;
        let memory = snapshot.memory();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO system_data
                (timestamp, ram_total, ram_used, ram_percent, network_connections, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.timestamp_text(),
                memory.total(),
                memory.used(),
                memory.percent(),
                network,
                now_text(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_emergency(&self, reason: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO emergency_trigger (timestamp, reason, status) VALUES (?1, ?2, ?3)",
            params![now_text(), reason, EMERGENCY_STATUS_ACTIVE],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS system_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            ram_total REAL NOT NULL,
            ram_used REAL NOT NULL,
            ram_percent REAL NOT NULL,
            network_connections TEXT NOT NULL,
            received_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS network_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            ssid TEXT,
            local_ip TEXT,
            status TEXT
        );
        CREATE TABLE IF NOT EXISTS permissions_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            permission TEXT,
            status TEXT
        );
        CREATE TABLE IF NOT EXISTS emergency_trigger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL
        );
        ",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn count(conn: &Connection, table: &str) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn now_text() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
