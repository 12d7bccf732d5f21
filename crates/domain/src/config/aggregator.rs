use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Daily summary aggregator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// How often the rollup / reconciliation job runs.
    #[serde(default = "d_interval_ms")]
    pub interval_ms: u64,
    /// Day partitions re-scanned per run (today plus N-1 preceding days).
    #[serde(default = "d_lookback_days")]
    pub lookback_days: u32,
    /// A check whose `updated_at` lags behind `reconcile_stale_factor ×
    /// interval` is re-derived from history.
    #[serde(default = "d_reconcile_stale_factor")]
    pub reconcile_stale_factor: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            interval_ms: d_interval_ms(),
            lookback_days: d_lookback_days(),
            reconcile_stale_factor: d_reconcile_stale_factor(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_interval_ms() -> u64 {
    3_600_000
}
fn d_lookback_days() -> u32 {
    2
}
fn d_reconcile_stale_factor() -> u32 {
    2
}
