//! Link-loss watchdog.
//!
//! Tracks when the last decrypted message arrived. Once the link has been
//! silent for the configured timeout, one emergency is raised; the next
//! message ends the outage and re-arms the watchdog. Nothing is raised before
//! the first message ever arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::server::ServerEvent;
use super::store::{SnapshotStore, StoreError};

/// Reason recorded for a silence-triggered emergency.
pub const EMERGENCY_REASON_LINK_LOST: &str = "connection lost";

/// Shortest polling period `run` will use.
pub const MIN_WATCHDOG_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Watch {
    last_seen: Option<Instant>,
    tripped: bool,
}

/// Silence detector shared by all connection tasks.
#[derive(Debug)]
pub struct LinkWatchdog {
    timeout: Duration,
    watch: Mutex<Watch>,
}

impl LinkWatchdog {
    /// Watchdog that trips after `timeout` of silence.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            watch: Mutex::new(Watch::default()),
        }
    }

    /// Configured silence limit.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A message arrived.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    fn touch_at(&self, now: Instant) {
        let mut watch = self.watch.lock();
        watch.last_seen = Some(now);
        watch.tripped = false;
    }

    /// Returns the silence duration the first time it reaches the timeout
    /// within one outage, `None` otherwise.
    pub fn check(&self, now: Instant) -> Option<Duration> {
        let mut watch = self.watch.lock();
        let last = watch.last_seen?;
        if watch.tripped {
            return None;
        }
        let silent = now.saturating_duration_since(last);
        if silent >= self.timeout {
            watch.tripped = true;
            Some(silent)
        } else {
            None
        }
    }

    /// Poll every `interval` (at least [`MIN_WATCHDOG_INTERVAL`]) until the
    /// task is aborted, recording each outage in `store` and announcing it on
    /// `events`.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        store: Arc<dyn SnapshotStore>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut ticker = tokio::time::interval(interval.max(MIN_WATCHDOG_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(silent_for) = self.check(Instant::now()) else {
                continue;
            };
            warn!(?silent_for, "no client traffic; raising emergency");

            let store = Arc::clone(&store);
            let recorded = tokio::task::spawn_blocking(move || {
                store.record_emergency(EMERGENCY_REASON_LINK_LOST)
            })
            .await
            .unwrap_or_else(|e| Err(StoreError::Worker(e.to_string())));

            let row_id = match recorded {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(error = %e, "failed to record emergency");
                    None
                }
            };
            let _ = events.send(ServerEvent::EmergencyTriggered { row_id, silent_for });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::SqliteStore;

    #[test]
    fn test_not_armed_before_first_message() {
        let dog = LinkWatchdog::new(Duration::from_secs(30));
        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(dog.check(later), None);
    }

    #[test]
    fn test_trips_once_per_outage() {
        let dog = LinkWatchdog::new(Duration::from_secs(30));
        let start = Instant::now();
        dog.touch_at(start);

        assert_eq!(dog.check(start + Duration::from_secs(29)), None);
        assert_eq!(
            dog.check(start + Duration::from_secs(30)),
            Some(Duration::from_secs(30))
        );
        assert_eq!(dog.check(start + Duration::from_secs(31)), None);
        assert_eq!(dog.check(start + Duration::from_secs(600)), None);
    }

    #[test]
    fn test_message_ends_outage() {
        let dog = LinkWatchdog::new(Duration::from_secs(10));
        let start = Instant::now();
        dog.touch_at(start);
        assert!(dog.check(start + Duration::from_secs(10)).is_some());

        let resumed = start + Duration::from_secs(20);
        dog.touch_at(resumed);
        assert_eq!(dog.check(resumed + Duration::from_secs(5)), None);
        assert!(dog.check(resumed + Duration::from_secs(10)).is_some());
    }

    #[tokio::test]
    async fn test_run_records_and_announces() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let dog = Arc::new(LinkWatchdog::new(Duration::from_millis(50)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        dog.touch();
        let task = tokio::spawn(Arc::clone(&dog).run(
            Duration::from_millis(10),
            store.clone(),
            tx,
        ));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            ServerEvent::EmergencyTriggered { row_id: Some(_), .. }
        ));
        assert_eq!(store.emergency_count().unwrap(), 1);

        // Still silent: no second trigger.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(store.emergency_count().unwrap(), 1);

        task.abort();
    }

    #[tokio::test]
    async fn test_run_with_zero_interval_still_polls() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let dog = Arc::new(LinkWatchdog::new(Duration::from_millis(20)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        dog.touch();
        let task = tokio::spawn(Arc::clone(&dog).run(Duration::ZERO, store.clone(), tx));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ServerEvent::EmergencyTriggered { .. }));
        assert!(!task.is_finished());
        task.abort();
    }
}
