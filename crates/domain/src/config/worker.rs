use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::region::{Region, DEFAULT_REGIONS};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Region this worker probes. Overridable via `REGION` / `--region`.
    #[serde(default)]
    pub region: Region,
    /// Closed set of region tags checks may be pinned to.
    #[serde(default = "d_allowed_regions")]
    pub allowed_regions: Vec<String>,
    /// Local state directory (durable replay queue, reference store files).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            allowed_regions: d_allowed_regions(),
            state_path: d_state_path(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_allowed_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|s| s.to_string()).collect()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
