use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay between ticks. A tick never overlaps itself; if a tick runs
    /// long the next one starts immediately after it completes.
    #[serde(default = "d_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Max in-flight probe pipelines per worker.
    #[serde(default = "d_concurrency")]
    pub concurrency: usize,
    /// Max due checks fetched per tick.
    #[serde(default = "d_batch_limit")]
    pub batch_limit: usize,
    /// Region lock lease duration.
    #[serde(default = "d_lock_lease_ms")]
    pub lock_lease_ms: u64,
    /// Scheduling jitter applied to `next_due`, in percent of the interval.
    #[serde(default = "d_jitter_pct")]
    pub jitter_pct: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: d_tick_interval_ms(),
            concurrency: d_concurrency(),
            batch_limit: d_batch_limit(),
            lock_lease_ms: d_lock_lease_ms(),
            jitter_pct: d_jitter_pct(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_tick_interval_ms() -> u64 {
    60_000
}
fn d_concurrency() -> usize {
    128
}
fn d_batch_limit() -> usize {
    500
}
fn d_lock_lease_ms() -> u64 {
    300_000
}
fn d_jitter_pct() -> u8 {
    10
}
