//! In-memory reference store.
//!
//! Backs tests and single-node deployments. Semantics mirror what the
//! managed document store provides: conditional writes guarded on
//! `updated_at`, idempotent appends keyed by outcome id, atomic counter
//! increments, and time-leased region locks. An availability failpoint lets
//! tests exercise the sink's retry / replay paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use exit1_domain::check::Check;
use exit1_domain::outcome::ProbeOutcome;
use exit1_domain::region::Region;
use exit1_domain::rollup::DailyRollup;
use exit1_domain::subscription::AlertSubscription;

use crate::{
    BudgetKey, BudgetStore, CheckDelta, CheckStore, OutcomeStore, RegionLease, RegionLockStore,
    RollupStore, StoreError, StoreResult, SubscriptionStore,
};

#[derive(Default)]
pub struct MemoryStore {
    checks: RwLock<HashMap<String, Check>>,
    outcomes: RwLock<HashMap<String, Vec<ProbeOutcome>>>,
    outcome_ids: RwLock<HashSet<String>>,
    rollups: RwLock<HashMap<(String, NaiveDate), DailyRollup>>,
    subscriptions: RwLock<HashMap<String, AlertSubscription>>,
    budgets: RwLock<HashMap<BudgetKey, u32>>,
    locks: RwLock<HashMap<String, RegionLease>>,
    /// Failpoint: the next N outcome appends report `Unavailable`.
    fail_appends: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` outcome appends fail with `Unavailable`.
    pub fn fail_next_appends(&self, n: u32) {
        self.fail_appends.store(n, Ordering::SeqCst);
    }

    fn take_append_failure(&self) -> bool {
        self.fail_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Checks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl CheckStore for MemoryStore {
    async fn insert(&self, check: Check) -> StoreResult<()> {
        self.checks.write().await.insert(check.id.clone(), check);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Check> {
        self.checks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("targets/{id}")))
    }

    async fn replace(&self, check: Check) -> StoreResult<()> {
        let mut map = self.checks.write().await;
        if !map.contains_key(&check.id) {
            return Err(StoreError::NotFound(format!("targets/{}", check.id)));
        }
        map.insert(check.id.clone(), check);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.checks
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("targets/{id}")))
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Check>> {
        let mut out: Vec<Check> = self
            .checks
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.order_index);
        Ok(out)
    }

    async fn list_all(&self) -> StoreResult<Vec<Check>> {
        Ok(self.checks.read().await.values().cloned().collect())
    }

    async fn due_in_region(
        &self,
        region: &Region,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Check>> {
        let mut due: Vec<Check> = self
            .checks
            .read()
            .await
            .values()
            .filter(|c| c.region == *region && c.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|c| c.next_due_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn update_guarded(
        &self,
        id: &str,
        expected_updated_at: DateTime<Utc>,
        delta: CheckDelta,
    ) -> StoreResult<Check> {
        let mut map = self.checks.write().await;
        let check = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("targets/{id}")))?;
        if check.updated_at != expected_updated_at {
            return Err(StoreError::Conflict(format!(
                "targets/{id}: updated_at {} != expected {}",
                check.updated_at, expected_updated_at
            )));
        }
        delta.apply(check);
        check.updated_at = Utc::now().max(check.updated_at + Duration::microseconds(1));
        Ok(check.clone())
    }

    async fn stale(&self, now: DateTime<Utc>, stale_factor: u32) -> StoreResult<Vec<Check>> {
        Ok(self
            .checks
            .read()
            .await
            .values()
            .filter(|c| {
                c.enabled
                    && !c.disabled
                    && now - c.updated_at > c.interval() * stale_factor as i32
            })
            .cloned()
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcomes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl OutcomeStore for MemoryStore {
    async fn append(&self, outcome: &ProbeOutcome) -> StoreResult<()> {
        if self.take_append_failure() {
            return Err(StoreError::Unavailable("append failpoint".into()));
        }
        // Idempotent on id: duplicate appends are silently dropped.
        if !self.outcome_ids.write().await.insert(outcome.id.clone()) {
            return Ok(());
        }
        self.outcomes
            .write()
            .await
            .entry(outcome.check_id.clone())
            .or_default()
            .push(outcome.clone());
        Ok(())
    }

    async fn list_for_day(
        &self,
        check_id: &str,
        day: NaiveDate,
    ) -> StoreResult<Vec<ProbeOutcome>> {
        Ok(self
            .outcomes
            .read()
            .await
            .get(check_id)
            .map(|v| v.iter().filter(|o| o.day() == day).cloned().collect())
            .unwrap_or_default())
    }

    async fn latest(&self, check_id: &str, limit: usize) -> StoreResult<Vec<ProbeOutcome>> {
        Ok(self
            .outcomes
            .read()
            .await
            .get(check_id)
            .map(|v| v.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn history(
        &self,
        check_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<ProbeOutcome>> {
        Ok(self
            .outcomes
            .read()
            .await
            .get(check_id)
            .map(|v| {
                v.iter()
                    .rev()
                    .filter(|o| o.at >= from && o.at <= to)
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn purge_check(&self, check_id: &str) -> StoreResult<u64> {
        let removed = self.outcomes.write().await.remove(check_id);
        let outcomes = removed.unwrap_or_default();
        let mut ids = self.outcome_ids.write().await;
        for o in &outcomes {
            ids.remove(&o.id);
        }
        Ok(outcomes.len() as u64)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rollups
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl RollupStore for MemoryStore {
    async fn apply_outcome(
        &self,
        outcome: &ProbeOutcome,
        redirect_as_online: bool,
    ) -> StoreResult<()> {
        let mut map = self.rollups.write().await;
        map.entry((outcome.check_id.clone(), outcome.day()))
            .or_insert_with(|| DailyRollup::empty(&outcome.check_id, outcome.day()))
            .merge(outcome, redirect_as_online);
        Ok(())
    }

    async fn put_rollup(&self, rollup: DailyRollup) -> StoreResult<()> {
        self.rollups
            .write()
            .await
            .insert((rollup.check_id.clone(), rollup.day), rollup);
        Ok(())
    }

    async fn get_rollup(&self, check_id: &str, day: NaiveDate) -> StoreResult<Option<DailyRollup>> {
        Ok(self
            .rollups
            .read()
            .await
            .get(&(check_id.to_string(), day))
            .cloned())
    }

    async fn list_for_check(
        &self,
        check_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DailyRollup>> {
        let mut rows: Vec<DailyRollup> = self
            .rollups
            .read()
            .await
            .values()
            .filter(|r| r.check_id == check_id && r.day >= from && r.day <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.day);
        Ok(rows)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscriptions, budgets, region locks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get_subscription(&self, user_id: &str) -> StoreResult<Option<AlertSubscription>> {
        Ok(self.subscriptions.read().await.get(user_id).cloned())
    }

    async fn put_subscription(&self, subscription: AlertSubscription) -> StoreResult<()> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.user_id.clone(), subscription);
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn increment(&self, key: &BudgetKey) -> StoreResult<u32> {
        let mut map = self.budgets.write().await;
        let count = map.entry(key.clone()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn decrement(&self, key: &BudgetKey) -> StoreResult<()> {
        let mut map = self.budgets.write().await;
        if let Some(count) = map.get_mut(key) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    async fn get_count(&self, key: &BudgetKey) -> StoreResult<u32> {
        Ok(self.budgets.read().await.get(key).copied().unwrap_or(0))
    }
}

#[async_trait]
impl RegionLockStore for MemoryStore {
    async fn try_acquire(
        &self,
        region: &Region,
        holder_id: &str,
        now: DateTime<Utc>,
        lease_ms: u64,
    ) -> StoreResult<bool> {
        let mut locks = self.locks.write().await;
        if let Some(lease) = locks.get(region.as_str()) {
            if lease.holder_id != holder_id && lease.expires_at > now {
                return Ok(false);
            }
        }
        locks.insert(
            region.as_str().to_string(),
            RegionLease {
                holder_id: holder_id.to_string(),
                acquired_at: now,
                expires_at: now + Duration::milliseconds(lease_ms as i64),
            },
        );
        Ok(true)
    }

    async fn release(&self, region: &Region, holder_id: &str) -> StoreResult<()> {
        let mut locks = self.locks.write().await;
        if locks
            .get(region.as_str())
            .is_some_and(|l| l.holder_id == holder_id)
        {
            locks.remove(region.as_str());
        }
        Ok(())
    }

    async fn current(&self, region: &Region) -> StoreResult<Option<RegionLease>> {
        Ok(self.locks.read().await.get(region.as_str()).cloned())
    }
}
