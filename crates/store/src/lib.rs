//! Storage abstraction for the monitoring worker.
//!
//! The backing document database is opaque; the worker talks to it through
//! the repository traits below. [`memory::MemoryStore`] is the reference
//! implementation used by tests and single-node deployments; a managed
//! document store plugs in behind the same traits.

pub mod memory;
pub mod queue;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use exit1_domain::check::{Check, CheckStatus};
use exit1_domain::outcome::ProbeOutcome;
use exit1_domain::region::Region;
use exit1_domain::rollup::DailyRollup;
use exit1_domain::subscription::{AlertSubscription, ChannelKind};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A conditional write lost to a concurrent writer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store could not be reached (or simulated as such).
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State delta
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runtime-state patch applied to a check record through a conditional
/// write. Only the pipeline produces these.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckDelta {
    pub status: Option<CheckStatus>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub last_status_code: Option<Option<u16>>,
    pub last_error: Option<Option<String>>,
    pub consecutive_failures: Option<u32>,
    pub first_failure_at: Option<Option<DateTime<Utc>>>,
    /// `Some((at, reason))` disables the check.
    pub disable: Option<(DateTime<Utc>, String)>,
}

impl CheckDelta {
    /// Apply the patch in place. `updated_at` is bumped by the store, not
    /// here, so retries re-read a consistent guard value.
    pub fn apply(&self, check: &mut Check) {
        if let Some(v) = self.status {
            check.status = v;
        }
        if let Some(v) = self.last_checked_at {
            check.last_checked_at = Some(v);
        }
        if let Some(v) = self.next_due_at {
            check.next_due_at = Some(v);
        }
        if let Some(v) = self.last_response_time_ms {
            check.last_response_time_ms = Some(v);
        }
        if let Some(v) = &self.last_status_code {
            check.last_status_code = *v;
        }
        if let Some(v) = &self.last_error {
            check.last_error = v.clone();
        }
        if let Some(v) = self.consecutive_failures {
            check.consecutive_failures = v;
        }
        if let Some(v) = self.first_failure_at {
            check.first_failure_at = v;
        }
        if let Some((at, reason)) = &self.disable {
            check.disabled = true;
            check.disabled_at = Some(*at);
            check.disabled_reason = Some(reason.clone());
            check.next_due_at = None;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repository traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait CheckStore: Send + Sync {
    async fn insert(&self, check: Check) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Check>;
    /// Full-record replacement; used by registration wrappers only.
    async fn replace(&self, check: Check) -> StoreResult<()>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Check>>;
    async fn list_all(&self) -> StoreResult<Vec<Check>>;

    /// Due-batch query for one scheduler tick: `region == region AND enabled
    /// AND NOT disabled AND next_due <= now`, ordered by `next_due` ASC.
    async fn due_in_region(
        &self,
        region: &Region,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Check>>;

    /// Conditional read-modify-write: applies `delta` only when the stored
    /// `updated_at` still equals `expected_updated_at`, then bumps the
    /// guard. Returns [`StoreError::Conflict`] when a concurrent writer won.
    async fn update_guarded(
        &self,
        id: &str,
        expected_updated_at: DateTime<Utc>,
        delta: CheckDelta,
    ) -> StoreResult<Check>;

    /// Checks whose `updated_at` is older than `now − stale_factor ×
    /// interval`; input to the reconciler.
    async fn stale(&self, now: DateTime<Utc>, stale_factor: u32) -> StoreResult<Vec<Check>>;
}

#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Append one outcome. Idempotent on `outcome.id`: a duplicate append
    /// is a no-op, so persistence retries and queue replay are safe.
    async fn append(&self, outcome: &ProbeOutcome) -> StoreResult<()>;
    async fn list_for_day(&self, check_id: &str, day: NaiveDate)
        -> StoreResult<Vec<ProbeOutcome>>;
    /// Newest outcomes first.
    async fn latest(&self, check_id: &str, limit: usize) -> StoreResult<Vec<ProbeOutcome>>;
    /// Time-windowed history, newest first.
    async fn history(
        &self,
        check_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<ProbeOutcome>>;
    /// User-requested purge (cascade from account deletion).
    async fn purge_check(&self, check_id: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait RollupStore: Send + Sync {
    /// Fold one outcome into the (check, day) row with counter increments.
    /// `redirect_as_online` is the owning check's redirect treatment.
    async fn apply_outcome(
        &self,
        outcome: &ProbeOutcome,
        redirect_as_online: bool,
    ) -> StoreResult<()>;
    /// Replace a whole row (aggregator recompute).
    async fn put_rollup(&self, rollup: DailyRollup) -> StoreResult<()>;
    async fn get_rollup(&self, check_id: &str, day: NaiveDate) -> StoreResult<Option<DailyRollup>>;
    async fn list_for_check(
        &self,
        check_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyRollup>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<AlertSubscription>>;
    async fn put_subscription(&self, subscription: AlertSubscription) -> StoreResult<()>;
}

/// Budget counter window kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetWindow {
    Hour,
    Month,
}

/// Key of one alert budget counter: `(user, channel, window_start)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetKey {
    pub user_id: String,
    pub channel: ChannelKind,
    pub window: BudgetWindow,
    /// Window start, unix millis.
    pub window_start_ms: i64,
}

impl BudgetKey {
    /// Document key, e.g. `alert_budgets_hour/u1__webhook__1700000000000`.
    pub fn doc_key(&self) -> String {
        let collection = match self.window {
            BudgetWindow::Hour => "alert_budgets_hour",
            BudgetWindow::Month => "alert_budgets_month",
        };
        format!(
            "{collection}/{}__{}__{}",
            self.user_id,
            self.channel.as_str(),
            self.window_start_ms
        )
    }
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Atomically increment and return the post-increment count.
    async fn increment(&self, key: &BudgetKey) -> StoreResult<u32>;
    /// Compensating decrement after an over-budget increment.
    async fn decrement(&self, key: &BudgetKey) -> StoreResult<()>;
    async fn get_count(&self, key: &BudgetKey) -> StoreResult<u32>;
}

/// Time-leased exclusive claim on a region. At most one holder at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionLease {
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait RegionLockStore: Send + Sync {
    /// Try to take (or re-take, for the same holder) the region lease.
    /// Returns `false` when another live holder owns it.
    async fn try_acquire(
        &self,
        region: &Region,
        holder_id: &str,
        now: DateTime<Utc>,
        lease_ms: u64,
    ) -> StoreResult<bool>;
    /// Release only when held by `holder_id`.
    async fn release(&self, region: &Region, holder_id: &str) -> StoreResult<()>;
    async fn current(&self, region: &Region) -> StoreResult<Option<RegionLease>>;
}
