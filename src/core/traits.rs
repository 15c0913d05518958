//! Collaborator traits consumed by the transport core.

use crate::snapshot::MetricsSnapshot;

/// Source of point-in-time metric snapshots.
///
/// Collection never fails: unreadable memory is reported as
/// [`MemoryUsage::unavailable`](crate::snapshot::MemoryUsage::unavailable) and
/// unreadable connection tables as an empty list, so the session loop always
/// has something to send.
///
/// Any `FnMut() -> MetricsSnapshot` closure is a source, which keeps tests free
/// of host-specific readings:
///
/// ```ignore
/// let mut source = || MetricsSnapshot::new(ts, memory, Vec::new()).unwrap();
/// let snapshot = source.collect();
/// ```
pub trait MetricsSource: Send + 'static {
    /// Take one snapshot.
    fn collect(&mut self) -> MetricsSnapshot;
}

impl<F> MetricsSource for F
where
    F: FnMut() -> MetricsSnapshot + Send + 'static,
{
    fn collect(&mut self) -> MetricsSnapshot {
        self()
    }
}
