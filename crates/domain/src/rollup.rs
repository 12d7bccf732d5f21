//! Daily rollups — materialized per-(check, UTC day) outcome summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::outcome::{OutcomeKind, ProbeOutcome};

/// At most one row per (check, day); derivable from the day's outcomes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub check_id: String,
    pub day: NaiveDate,
    pub total_probes: u64,
    pub failure_count: u64,
    /// True when the day saw at least one non-ok outcome.
    pub has_issue: bool,
    pub worst_kind: OutcomeKind,
    /// Sum of response times; the mean is derived on read so increments
    /// stay atomic counter updates.
    pub response_time_sum_ms: u64,
}

impl DailyRollup {
    pub fn empty(check_id: &str, day: NaiveDate) -> Self {
        Self {
            check_id: check_id.to_string(),
            day,
            total_probes: 0,
            failure_count: 0,
            has_issue: false,
            worst_kind: OutcomeKind::Ok,
            response_time_sum_ms: 0,
        }
    }

    /// Fold one outcome into the rollup. `redirect_as_online` is the
    /// owning check's redirect treatment.
    pub fn merge(&mut self, outcome: &ProbeOutcome, redirect_as_online: bool) {
        self.total_probes += 1;
        self.response_time_sum_ms += outcome.response_time_ms;
        if outcome.kind.is_failure(redirect_as_online) {
            self.failure_count += 1;
            self.has_issue = true;
        }
        if outcome.kind.severity() > self.worst_kind.severity() {
            self.worst_kind = outcome.kind;
        }
    }

    pub fn mean_response_time_ms(&self) -> f64 {
        if self.total_probes == 0 {
            0.0
        } else {
            self.response_time_sum_ms as f64 / self.total_probes as f64
        }
    }

    /// Uptime fraction for the day (redirects count as up).
    pub fn uptime_ratio(&self) -> f64 {
        if self.total_probes == 0 {
            1.0
        } else {
            (self.total_probes - self.failure_count) as f64 / self.total_probes as f64
        }
    }
}
