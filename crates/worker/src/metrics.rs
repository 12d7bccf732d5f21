//! Process-wide counters surfaced through `/metricsz` and the logs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use exit1_probe::dns::DnsStatsSnapshot;

#[derive(Default)]
pub struct Metrics {
    pub ticks_total: AtomicU64,
    /// Overrun of the most recent tick past the tick interval.
    pub tick_lag_ms: AtomicU64,
    pub lock_not_acquired: AtomicU64,
    pub probes_total: AtomicU64,
    pub probes_failed: AtomicU64,
    pub probes_cancelled: AtomicU64,
    pub state_conflicts: AtomicU64,
    pub outcomes_queued: AtomicU64,
    pub outcomes_replayed: AtomicU64,
    pub alerts_delivered: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub alerts_failed: AtomicU64,
    pub auto_disabled: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    pub tick_lag_ms: u64,
    pub lock_not_acquired: u64,
    pub probes_total: u64,
    pub probes_failed: u64,
    pub probes_cancelled: u64,
    pub state_conflicts: u64,
    pub outcomes_queued: u64,
    pub outcomes_replayed: u64,
    pub alerts_delivered: u64,
    pub alerts_suppressed: u64,
    pub alerts_failed: u64,
    pub auto_disabled: u64,
    pub dns: DnsStatsSnapshot,
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, dns: DnsStatsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            tick_lag_ms: self.tick_lag_ms.load(Ordering::Relaxed),
            lock_not_acquired: self.lock_not_acquired.load(Ordering::Relaxed),
            probes_total: self.probes_total.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            probes_cancelled: self.probes_cancelled.load(Ordering::Relaxed),
            state_conflicts: self.state_conflicts.load(Ordering::Relaxed),
            outcomes_queued: self.outcomes_queued.load(Ordering::Relaxed),
            outcomes_replayed: self.outcomes_replayed.load(Ordering::Relaxed),
            alerts_delivered: self.alerts_delivered.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            auto_disabled: self.auto_disabled.load(Ordering::Relaxed),
            dns,
        }
    }
}
