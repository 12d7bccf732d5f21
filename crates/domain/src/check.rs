//! Check data model — the monitored endpoint and its runtime state.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::region::Region;
use crate::tier::Tier;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status & policy enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derived status of a check, updated after every classified probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Degraded,
    /// A redirect was flagged. Treated as online for uptime.
    Redirect,
    Disabled,
}

impl CheckStatus {
    /// `offline` and `degraded` are the failing statuses.
    pub fn is_failing(self) -> bool {
        matches!(self, CheckStatus::Offline | CheckStatus::Degraded)
    }

    /// `online` and `redirect` both count as up.
    pub fn is_up(self) -> bool {
        matches!(self, CheckStatus::Online | CheckStatus::Redirect)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// What the engine does when the target answers with a 3xx.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectPolicy {
    /// Follow up to the configured hop limit; classify the final response.
    #[default]
    Follow,
    /// Do not follow; any redirect yields the `redirect` outcome.
    Flag,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expected status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Inclusive HTTP status range, e.g. `200-299` or a single `301`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    pub from: u16,
    pub to: u16,
}

impl StatusRange {
    pub fn single(code: u16) -> Self {
        Self { from: code, to: code }
    }

    pub fn contains(&self, code: u16) -> bool {
        (self.from..=self.to).contains(&code)
    }
}

/// Set of acceptable response statuses. Defaults to the 2xx class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedStatus(pub Vec<StatusRange>);

impl ExpectedStatus {
    pub fn matches(&self, code: u16) -> bool {
        self.0.iter().any(|r| r.contains(code))
    }
}

impl Default for ExpectedStatus {
    fn default() -> Self {
        Self(vec![StatusRange { from: 200, to: 299 }])
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Check model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_true() -> bool {
    true
}

/// A monitored endpoint. Configuration fields are user-supplied at
/// registration; runtime fields are owned by the pipeline and mutated only
/// through conditional writes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Check {
    pub id: String,
    pub user_id: String,

    // ── Configuration ─────────────────────────────────────────────────
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub expected_status: ExpectedStatus,
    /// Body-substring assertion evaluated on expected-status responses.
    #[serde(default)]
    pub assert_body_contains: Option<String>,
    pub interval_seconds: u32,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub redirect_policy: RedirectPolicy,
    /// When false, a flagged redirect classifies as degraded and counts
    /// against uptime instead of being treated as online.
    #[serde(default = "d_true")]
    pub treat_redirect_as_online: bool,
    #[serde(default)]
    pub ipv6_preferred: bool,
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Owner tier cached on the record so the hot path skips a directory
    /// lookup. Refreshed by the account service on tier changes.
    #[serde(default)]
    pub tier: Tier,
    /// UI ordering index.
    #[serde(default)]
    pub order_index: i64,

    // ── Disable state ─────────────────────────────────────────────────
    /// Sticky disabled flag: set manually by the user or automatically
    /// after a sustained failure streak. `disabled` implies not scheduled.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub disabled_at: Option<DateTime<Utc>>,
    /// `"manual"` or `"sustained_failure"`.
    #[serde(default)]
    pub disabled_reason: Option<String>,

    // ── Runtime state ─────────────────────────────────────────────────
    #[serde(default)]
    pub status: CheckStatus,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_response_time_ms: Option<u64>,
    #[serde(default)]
    pub last_status_code: Option<u16>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub first_failure_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    /// Conditional-write guard: every state update compares and bumps this.
    pub updated_at: DateTime<Utc>,
}

impl Check {
    /// Build a new check from configuration, schedulable immediately.
    pub fn new(user_id: &str, name: &str, url: &str, interval_seconds: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            method: HttpMethod::default(),
            expected_status: ExpectedStatus::default(),
            assert_body_contains: None,
            interval_seconds,
            headers: HashMap::new(),
            request_body: None,
            region: Region::default(),
            redirect_policy: RedirectPolicy::default(),
            treat_redirect_as_online: true,
            ipv6_preferred: false,
            enabled: true,
            tier: Tier::default(),
            order_index: 0,
            disabled: false,
            disabled_at: None,
            disabled_reason: None,
            status: CheckStatus::Unknown,
            last_checked_at: None,
            next_due_at: Some(now),
            last_response_time_ms: None,
            last_status_code: None,
            last_error: None,
            consecutive_failures: 0,
            first_failure_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Registration-time validation. Violations never reach the scheduler.
    pub fn validate(&self, allowed_regions: &[String]) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("check name must not be empty".into()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "check url must be http(s), got '{}'",
                self.url
            )));
        }
        let floor = self.tier.min_interval_seconds();
        if self.interval_seconds < floor {
            return Err(Error::Config(format!(
                "interval {}s below tier minimum {}s",
                self.interval_seconds, floor
            )));
        }
        if !allowed_regions.iter().any(|r| r == self.region.as_str()) {
            return Err(Error::Config(format!(
                "region '{}' is not in the allowed set",
                self.region
            )));
        }
        for range in &self.expected_status.0 {
            if range.from > range.to || range.from < 100 || range.to > 599 {
                return Err(Error::Config(format!(
                    "invalid expected status range {}-{}",
                    range.from, range.to
                )));
            }
        }
        Ok(())
    }

    /// Whether the scheduler may pick this check up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && !self.disabled
            && self.next_due_at.map_or(true, |due| due <= now)
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(i64::from(self.interval_seconds))
    }
}
