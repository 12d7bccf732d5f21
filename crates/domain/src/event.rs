//! Transition events — emitted when a check's derived status changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::check::CheckStatus;
use crate::region::Region;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WentOffline,
    CameOnline,
    /// A failing check changed its failure mode (degraded ↔ offline with a
    /// new error string).
    ErrorObserved,
    /// The check was disabled after a sustained failure streak. Terminal.
    AutoDisabled,
}

/// One status transition for one check. Events for a given check are totally
/// ordered because the classifier runs strictly serially per check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub kind: EventKind,
    pub check_id: String,
    pub user_id: String,
    pub region: Region,
    pub at: DateTime<Utc>,
    pub previous_status: CheckStatus,
    pub new_status: CheckStatus,
    /// Consecutive-failure count at emission time. For `came_online` this is
    /// the pre-recovery count, so thresholds apply after the reset.
    pub failures_at_emit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TransitionEvent {
    /// Dedupe key: identical tuples within the dedupe window collapse to a
    /// single dispatch per channel.
    pub fn dedupe_key(&self) -> String {
        format!("{}:{:?}:{:?}", self.check_id, self.kind, self.new_status)
    }
}
