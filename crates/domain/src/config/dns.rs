use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DNS resolver cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Ordered upstream servers. Retries rotate this list so successive
    /// attempts lead with a different provider.
    #[serde(default = "d_upstream_servers")]
    pub upstream_servers: Vec<String>,
    #[serde(default = "d_positive_ttl_ms")]
    pub positive_ttl_ms: u64,
    /// Negative TTL for permanent errors (NXDOMAIN, no-data).
    #[serde(default = "d_negative_ttl_permanent_ms")]
    pub negative_ttl_permanent_ms: u64,
    /// Negative TTL after transient retries were exhausted.
    #[serde(default = "d_negative_ttl_transient_ms")]
    pub negative_ttl_transient_ms: u64,
    #[serde(default = "d_per_query_timeout_ms")]
    pub per_query_timeout_ms: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,
    /// Cache eviction sweep interval.
    #[serde(default = "d_evict_interval_ms")]
    pub evict_interval_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstream_servers: d_upstream_servers(),
            positive_ttl_ms: d_positive_ttl_ms(),
            negative_ttl_permanent_ms: d_negative_ttl_permanent_ms(),
            negative_ttl_transient_ms: d_negative_ttl_transient_ms(),
            per_query_timeout_ms: d_per_query_timeout_ms(),
            max_retries: d_max_retries(),
            retry_backoff_ms: d_retry_backoff_ms(),
            evict_interval_ms: d_evict_interval_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_upstream_servers() -> Vec<String> {
    ["1.1.1.1", "8.8.8.8", "1.0.0.1", "8.8.4.4", "9.9.9.9"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn d_positive_ttl_ms() -> u64 {
    120_000
}
fn d_negative_ttl_permanent_ms() -> u64 {
    30_000
}
fn d_negative_ttl_transient_ms() -> u64 {
    5_000
}
fn d_per_query_timeout_ms() -> u64 {
    5_000
}
fn d_max_retries() -> u32 {
    3
}
fn d_retry_backoff_ms() -> Vec<u64> {
    vec![200, 400, 800]
}
fn d_evict_interval_ms() -> u64 {
    300_000
}
