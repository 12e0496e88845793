use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

use crate::state::{new_state, Shared, SnapshotStore};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub transport: String,
    pub data_ready: bool,
    pub snapshot_age_seconds: Option<i64>,
    pub nodes_tracked: u32,
    pub jobs_tracked: u32,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::timestamp::option")]
    pub last_success_at: Option<OffsetDateTime>,
    pub last_cycle_ms: Option<u64>,
    pub memory_usage_mb: f32,
}

/// Compteurs du poller, partagés avec l'API (`GET /status`).
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    transport: Arc<str>,
    cycles_ok: Arc<AtomicU64>,
    cycles_failed: Arc<AtomicU64>,
    last_error: Shared<Option<String>>,
    last_success: Shared<Option<OffsetDateTime>>,
    last_cycle: Shared<Option<Duration>>,
}

impl HealthTracker {
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            transport: Arc::from(transport.into()),
            cycles_ok: Arc::new(AtomicU64::new(0)),
            cycles_failed: Arc::new(AtomicU64::new(0)),
            last_error: new_state(None),
            last_success: new_state(None),
            last_cycle: new_state(None),
        }
    }

    pub fn mark_cycle_ok(&self, took: Duration) {
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = None;
        *self.last_success.lock() = Some(OffsetDateTime::now_utc());
        *self.last_cycle.lock() = Some(took);
    }

    /// L'erreur reste visible jusqu'au prochain cycle réussi.
    pub fn mark_cycle_failed(&self, error: &str, took: Duration) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
        *self.last_cycle.lock() = Some(took);
    }

    pub fn cycles_ok(&self) -> u64 {
        self.cycles_ok.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn get_health(&self, store: &SnapshotStore) -> KernelHealth {
        let snapshot = store.current();
        let now = OffsetDateTime::now_utc();

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            transport: self.transport.to_string(),
            data_ready: snapshot.is_some(),
            snapshot_age_seconds: snapshot
                .as_ref()
                .map(|s| (now - s.generated_at).whole_seconds().max(0)),
            nodes_tracked: snapshot.as_ref().map_or(0, |s| s.nodes.len() as u32),
            jobs_tracked: snapshot.as_ref().map_or(0, |s| s.jobs.len() as u32),
            cycles_ok: self.cycles_ok(),
            cycles_failed: self.cycles_failed(),
            last_error: self.last_error(),
            last_success_at: *self.last_success.lock(),
            last_cycle_ms: self.last_cycle.lock().map(|d| d.as_millis() as u64),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find_map(|l| l.strip_prefix("VmRSS:"))
                .and_then(|v| v.split_whitespace().next())
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Snapshot;

    #[test]
    fn test_counters_and_last_error() {
        let health = HealthTracker::new("fixtures in ./sample_data");
        health.mark_cycle_failed("ssh: timed out", Duration::from_millis(25_000));
        assert_eq!(health.cycles_failed(), 1);
        assert_eq!(health.last_error().as_deref(), Some("ssh: timed out"));

        health.mark_cycle_ok(Duration::from_millis(120));
        assert_eq!(health.cycles_ok(), 1);
        assert_eq!(health.last_error(), None);
    }

    #[test]
    fn test_report_reflects_store() {
        let health = HealthTracker::new("static");
        let store = SnapshotStore::new();

        let report = health.get_health(&store);
        assert!(!report.data_ready);
        assert_eq!(report.snapshot_age_seconds, None);
        assert_eq!(report.last_success_at, None);
        assert_eq!(report.transport, "static");

        store.publish(Snapshot::new(vec![], vec![]));
        health.mark_cycle_ok(Duration::from_millis(7));
        let report = health.get_health(&store);
        assert!(report.data_ready);
        assert_eq!(report.snapshot_age_seconds, Some(0));
        assert_eq!(report.last_cycle_ms, Some(7));
        assert!(report.last_success_at.is_some());
    }
}
