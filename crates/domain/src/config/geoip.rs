use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GeoIP enrichment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Paths to locally-loaded MaxMind databases. Missing paths disable the
/// corresponding lookup; enrichment is always best-effort.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeoIpConfig {
    #[serde(default)]
    pub city_db_path: Option<PathBuf>,
    #[serde(default)]
    pub asn_db_path: Option<PathBuf>,
    /// Also resolve PTR records for probed addresses.
    #[serde(default)]
    pub reverse_dns: bool,
}
