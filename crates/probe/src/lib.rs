//! Probe execution: DNS resolver cache, HTTP probe engine, and the target
//! metadata enricher.

pub mod dns;
pub mod engine;
pub mod enrich;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use exit1_domain::check::Check;
use exit1_domain::outcome::ProbeOutcome;

/// Output of one probe: the classified outcome plus the response headers
/// the metadata enricher consumes.
#[derive(Clone, Debug)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    /// Response headers (lowercase names). Empty when no response arrived.
    pub headers: Vec<(String, String)>,
}

/// Seam between the scheduler pipeline and the HTTP engine. Tests script
/// outcome sequences behind this trait; production uses
/// [`engine::ProbeEngine`].
#[async_trait]
pub trait Prober: Send + Sync {
    /// Execute one probe. Never fails: network errors become outcome kinds.
    async fn probe(&self, check: &Check, now: DateTime<Utc>) -> ProbeReport;
}
