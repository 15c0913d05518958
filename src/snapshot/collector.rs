//! Host metrics collector.
//!
//! Memory comes from `sysinfo`. Established TCP connections are read from the
//! procfs tables (`net/tcp`, then `net/tcp6`) in kernel enumeration order. On
//! hosts without procfs the connection list is simply empty.

use std::path::PathBuf;

use sysinfo::System;
use tracing::{debug, warn};

use super::model::{MemoryUsage, MetricsSnapshot, NetConnection, TcpState, now_seconds};
use super::procnet;
use crate::core::{MAX_CONNECTIONS, MetricsSource};

/// Tables read for connection enumeration, relative to the proc root.
const TCP_TABLES: [&str; 2] = ["net/tcp", "net/tcp6"];

/// Collects memory and connection metrics from the local host.
pub struct SystemCollector {
    system: System,
    proc_root: PathBuf,
    max_connections: usize,
}

impl SystemCollector {
    /// Create a collector reading from `/proc`.
    pub fn new() -> Self {
        Self {
            system: System::new(),
            proc_root: PathBuf::from("/proc"),
            max_connections: MAX_CONNECTIONS,
        }
    }

    /// Read connection tables from another proc root.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    /// Lower the number of reported connections. Values above
    /// [`MAX_CONNECTIONS`] are clamped.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.min(MAX_CONNECTIONS);
        self
    }

    fn memory(&mut self) -> MemoryUsage {
        self.system.refresh_memory();
        MemoryUsage::from_bytes(self.system.total_memory(), self.system.used_memory())
    }

    fn connections(&self) -> Vec<NetConnection> {
        let mut established = Vec::with_capacity(self.max_connections);

        for table in TCP_TABLES {
            if established.len() >= self.max_connections {
                break;
            }
            let path = self.proc_root.join(table);
            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "connection table unavailable");
                    continue;
                }
            };

            let remaining = self.max_connections - established.len();
            established.extend(
                procnet::parse_table(&contents)
                    .filter(|conn| conn.status == TcpState::Established)
                    .take(remaining),
            );
        }

        established
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SystemCollector {
    fn collect(&mut self) -> MetricsSnapshot {
        let memory = self.memory();
        let connections = self.connections();

        MetricsSnapshot::new(now_seconds(), memory, connections).unwrap_or_else(|e| {
            warn!(error = %e, "snapshot rejected, sending sentinel values");
            MetricsSnapshot::unavailable()
        })
    }
}

#[cfg(all(test, target_endian = "little"))]
mod tests {
    use super::*;

    fn row(slot: usize, state: &str) -> String {
        format!(
            "   {slot}: 0A01A8C0:{port:04X} 22D8B85D:01BB {state} 00000000:00000000 00:00000000 00000000  1000 0 1 1",
            port = 40000 + slot
        )
    }

    fn write_tables(dir: &std::path::Path, tcp: &[String], tcp6: &[String]) {
        let header = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";
        std::fs::create_dir_all(dir.join("net")).unwrap();
        std::fs::write(
            dir.join("net/tcp"),
            format!("{header}\n{}\n", tcp.join("\n")),
        )
        .unwrap();
        std::fs::write(
            dir.join("net/tcp6"),
            format!("{header}\n{}\n", tcp6.join("\n")),
        )
        .unwrap();
    }

    #[test]
    fn test_collect_caps_connections() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<String> = (0..12).map(|i| row(i, "01")).collect();
        write_tables(dir.path(), &rows, &rows);

        let mut collector = SystemCollector::new().with_proc_root(dir.path());
        let snapshot = collector.collect();

        assert_eq!(snapshot.connections().len(), MAX_CONNECTIONS);
        // Enumeration order is preserved.
        let ports: Vec<u16> = snapshot
            .connections()
            .iter()
            .map(|c| c.local_addr.port())
            .collect();
        assert_eq!(ports, vec![40000, 40001, 40002, 40003, 40004]);
    }

    #[test]
    fn test_collect_filters_established_across_tables() {
        let dir = tempfile::tempdir().unwrap();
        let tcp = vec![row(0, "0A"), row(1, "01"), row(2, "06"), row(3, "01")];
        let tcp6 = vec![row(4, "01"), row(5, "08")];
        write_tables(dir.path(), &tcp, &tcp6);

        let mut collector = SystemCollector::new().with_proc_root(dir.path());
        let snapshot = collector.collect();

        let ports: Vec<u16> = snapshot
            .connections()
            .iter()
            .map(|c| c.local_addr.port())
            .collect();
        assert_eq!(ports, vec![40001, 40003, 40004]);
        assert!(
            snapshot
                .connections()
                .iter()
                .all(|c| c.status == TcpState::Established)
        );
    }

    #[test]
    fn test_collect_missing_tables_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = SystemCollector::new().with_proc_root(dir.path().join("nope"));

        let snapshot = collector.collect();
        assert!(snapshot.connections().is_empty());
        assert!((0.0..=100.0).contains(&snapshot.memory().percent()));
    }

    #[test]
    fn test_max_connections_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<String> = (0..8).map(|i| row(i, "01")).collect();
        write_tables(dir.path(), &rows, &[]);

        let mut wide = SystemCollector::new()
            .with_proc_root(dir.path())
            .with_max_connections(50);
        assert_eq!(wide.collect().connections().len(), MAX_CONNECTIONS);

        let mut narrow = SystemCollector::new()
            .with_proc_root(dir.path())
            .with_max_connections(2);
        assert_eq!(narrow.collect().connections().len(), 2);
    }

    #[test]
    fn test_collect_canonical_text_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path(), &[row(0, "01")], &[]);

        let snapshot = SystemCollector::new().with_proc_root(dir.path()).collect();
        let text = snapshot.to_canonical_text().unwrap();
        assert_eq!(MetricsSnapshot::parse(&text).unwrap(), snapshot);
    }
}
