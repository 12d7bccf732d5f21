use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP probe engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProbeConfig {
    /// Hard deadline for DNS + TCP + TLS.
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Hard deadline for the whole probe.
    #[serde(default = "d_total_timeout_ms")]
    pub total_timeout_ms: u64,
    /// Redirect hops followed when the check's policy is `follow`.
    #[serde(default = "d_max_redirects")]
    pub max_redirects: usize,
    /// Response body capture cap; the rest of the stream is discarded.
    #[serde(default = "d_max_response_bytes")]
    pub max_response_bytes: usize,
    /// User-Agent sent with probes; checks may override via headers.
    #[serde(default = "d_user_agent")]
    pub user_agent: String,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: d_connect_timeout_ms(),
            total_timeout_ms: d_total_timeout_ms(),
            max_redirects: d_max_redirects(),
            max_response_bytes: d_max_response_bytes(),
            user_agent: d_user_agent(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_connect_timeout_ms() -> u64 {
    10_000
}
fn d_total_timeout_ms() -> u64 {
    30_000
}
fn d_max_redirects() -> usize {
    5
}
fn d_max_response_bytes() -> usize {
    64 * 1024
}
fn d_user_agent() -> String {
    "Exit1-Monitor/1.0".into()
}
