//! Result sink — durable persistence of probe outcomes and check state.
//!
//! Outcome appends retry with backoff and fall back to the local durable
//! queue; state updates are conditional on `updated_at` and re-applied
//! after a re-read on conflict. A state write that still fails is skipped:
//! the aggregator's reconciliation pass corrects it from history.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use exit1_domain::check::Check;
use exit1_domain::outcome::ProbeOutcome;
use exit1_domain::transition::Transition;
use exit1_store::queue::DurableQueue;
use exit1_store::retry::{with_retries, RetryPolicy};
use exit1_store::{CheckDelta, CheckStore, OutcomeStore, RollupStore, StoreError};

use crate::metrics::Metrics;

const STATE_WRITE_ATTEMPTS: u32 = 3;

pub struct ResultSink {
    checks: Arc<dyn CheckStore>,
    outcomes: Arc<dyn OutcomeStore>,
    rollups: Arc<dyn RollupStore>,
    queue: Arc<DurableQueue>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl ResultSink {
    pub fn new(
        checks: Arc<dyn CheckStore>,
        outcomes: Arc<dyn OutcomeStore>,
        rollups: Arc<dyn RollupStore>,
        queue: Arc<DurableQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            checks,
            outcomes,
            rollups,
            queue,
            retry: RetryPolicy::default(),
            metrics,
        }
    }

    /// Persist one classified probe: history append, rollup increment, and
    /// the conditional state update. Returns the check as written, or the
    /// locally-patched check when the state write had to be skipped.
    pub async fn record(
        &self,
        check: &Check,
        transition: &Transition,
        outcome: &ProbeOutcome,
        next_due: DateTime<Utc>,
    ) -> Check {
        self.append_outcome(outcome).await;

        if let Err(e) = self
            .rollups
            .apply_outcome(outcome, check.treat_redirect_as_online)
            .await
        {
            tracing::warn!(check_id = %check.id, error = %e, "rollup increment failed");
        }

        let delta = Self::delta_from(transition, outcome, next_due);
        self.update_state(check, delta).await
    }

    /// Append to the history store; on retry exhaustion park the outcome in
    /// the durable queue for replay.
    pub async fn append_outcome(&self, outcome: &ProbeOutcome) {
        let result = with_retries(&self.retry, || async {
            self.outcomes.append(outcome).await
        })
        .await;

        if let Err(e) = result {
            tracing::warn!(
                check_id = %outcome.check_id,
                outcome_id = %outcome.id,
                error = %e,
                "outcome append exhausted retries, queueing for replay"
            );
            Metrics::incr(&self.metrics.outcomes_queued);
            if let Err(e) = self.queue.push(outcome) {
                tracing::error!(outcome_id = %outcome.id, error = %e, "durable queue write failed");
            }
        }
    }

    /// Drain the local replay queue back into the history store. Outcomes
    /// that still fail are re-queued for the next pass.
    pub async fn replay_queued(&self, max: usize) -> usize {
        let batch = match self.queue.drain(max) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "replay queue drain failed");
                return 0;
            }
        };
        let mut replayed = 0;
        for outcome in batch {
            match self.outcomes.append(&outcome).await {
                Ok(()) => {
                    replayed += 1;
                    Metrics::incr(&self.metrics.outcomes_replayed);
                }
                Err(e) => {
                    tracing::debug!(outcome_id = %outcome.id, error = %e, "replay still failing");
                    let _ = self.queue.push(&outcome);
                }
            }
        }
        if replayed > 0 {
            tracing::info!(replayed, "replayed queued outcomes");
        }
        replayed
    }

    // ── Private ──────────────────────────────────────────────────────

    fn delta_from(
        transition: &Transition,
        outcome: &ProbeOutcome,
        next_due: DateTime<Utc>,
    ) -> CheckDelta {
        CheckDelta {
            status: Some(transition.status),
            last_checked_at: Some(outcome.at),
            next_due_at: Some(next_due),
            last_response_time_ms: Some(outcome.response_time_ms),
            last_status_code: Some(outcome.status_code),
            last_error: Some(transition.last_error.clone()),
            consecutive_failures: Some(transition.consecutive_failures),
            first_failure_at: Some(transition.first_failure_at),
            disable: transition
                .auto_disable
                .then(|| (outcome.at, "sustained_failure".to_string())),
        }
    }

    /// Conditional read-modify-write, re-read and re-applied on conflict up
    /// to three times, then skipped for this tick.
    async fn update_state(&self, check: &Check, delta: CheckDelta) -> Check {
        let mut guard = check.updated_at;
        for attempt in 0..STATE_WRITE_ATTEMPTS {
            match self
                .checks
                .update_guarded(&check.id, guard, delta.clone())
                .await
            {
                Ok(updated) => return updated,
                Err(StoreError::Conflict(_)) => {
                    Metrics::incr(&self.metrics.state_conflicts);
                    match self.checks.get(&check.id).await {
                        Ok(fresh) => guard = fresh.updated_at,
                        Err(e) => {
                            tracing::warn!(check_id = %check.id, error = %e, "re-read failed");
                            break;
                        }
                    }
                    tracing::debug!(check_id = %check.id, attempt, "state write conflict, re-applying");
                }
                Err(e) => {
                    tracing::warn!(check_id = %check.id, error = %e, "state write failed");
                    break;
                }
            }
        }
        // Yield: the reconciler re-derives state from history later. Hand
        // back a locally-patched copy so alerting still sees the new state.
        tracing::warn!(check_id = %check.id, "state update skipped this tick");
        let mut patched = check.clone();
        delta.apply(&mut patched);
        patched
    }
}
