//! Daily summary aggregator — materializes per-day rollups, reconciles
//! check state against history, and runs sink/dispatcher maintenance.

use std::time::Duration;

use chrono::{DateTime, Utc};

use exit1_domain::rollup::DailyRollup;
use exit1_store::{CheckDelta, CheckStore, OutcomeStore, RollupStore};

use crate::state::AppState;

const REPLAY_BATCH: usize = 500;

/// Run the aggregator on its schedule until shutdown.
pub async fn run(state: AppState) {
    let interval = Duration::from_millis(state.config.aggregator.interval_ms);
    tracing::info!(
        interval_ms = state.config.aggregator.interval_ms,
        lookback_days = state.config.aggregator.lookback_days,
        "aggregator started"
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // the first tick fires immediately; skip it
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                if let Err(e) = run_once(&state, now).await {
                    tracing::warn!(error = %e, "aggregator pass failed");
                }
            }
            _ = state.shutdown.cancelled() => break,
        }
    }
    tracing::info!("aggregator stopped");
}

/// One aggregation pass: recompute recent rollups, reconcile stale checks,
/// drain the outcome replay queue, prune the dispatcher dedupe map.
pub async fn run_once(state: &AppState, now: DateTime<Utc>) -> exit1_domain::Result<()> {
    rollup_pass(state, now).await;
    reconcile_pass(state, now).await;
    state.sink.replay_queued(REPLAY_BATCH).await;
    state.dispatcher.prune(now);
    Ok(())
}

/// Recompute rollups for the preceding N day partitions from raw history.
/// Deterministic by construction: the row is rebuilt, not incremented, so
/// replayed outcomes never double-count.
async fn rollup_pass(state: &AppState, now: DateTime<Utc>) {
    let checks = match state.checks.list_all().await {
        Ok(checks) => checks,
        Err(e) => {
            tracing::warn!(error = %e, "rollup pass: check listing failed");
            return;
        }
    };

    let mut rows = 0usize;
    for check in &checks {
        for days_back in 0..state.config.aggregator.lookback_days {
            let day = (now - chrono::Duration::days(i64::from(days_back))).date_naive();
            let outcomes = match state.outcomes.list_for_day(&check.id, day).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    tracing::warn!(check_id = %check.id, %day, error = %e, "day scan failed");
                    continue;
                }
            };
            if outcomes.is_empty() {
                continue;
            }
            let mut rollup = DailyRollup::empty(&check.id, day);
            for outcome in &outcomes {
                rollup.merge(outcome, check.treat_redirect_as_online);
            }
            if let Err(e) = state.rollups.put_rollup(rollup).await {
                tracing::warn!(check_id = %check.id, %day, error = %e, "rollup write failed");
            } else {
                rows += 1;
            }
        }
    }
    if rows > 0 {
        tracing::debug!(rows, "rollup pass complete");
    }
}

/// Patch checks whose record lags behind history (a state write was skipped
/// after its outcome landed): re-derive the last status from the newest
/// outcome.
async fn reconcile_pass(state: &AppState, now: DateTime<Utc>) {
    let stale = match state
        .checks
        .stale(now, state.config.aggregator.reconcile_stale_factor)
        .await
    {
        Ok(stale) => stale,
        Err(e) => {
            tracing::warn!(error = %e, "reconcile pass: stale query failed");
            return;
        }
    };

    for check in stale {
        let newest = match state.outcomes.latest(&check.id, 1).await {
            Ok(mut outcomes) => match outcomes.pop() {
                Some(o) => o,
                None => continue,
            },
            Err(e) => {
                tracing::warn!(check_id = %check.id, error = %e, "history read failed");
                continue;
            }
        };
        if newest.at <= check.updated_at {
            continue; // record already reflects the newest outcome
        }

        let delta = CheckDelta {
            status: Some(newest.kind.status(check.treat_redirect_as_online)),
            last_checked_at: Some(newest.at),
            last_response_time_ms: Some(newest.response_time_ms),
            last_status_code: Some(newest.status_code),
            last_error: Some(newest.short_error()),
            ..Default::default()
        };
        match state
            .checks
            .update_guarded(&check.id, check.updated_at, delta)
            .await
        {
            Ok(_) => {
                tracing::info!(check_id = %check.id, "reconciled check state from history");
            }
            Err(e) => {
                // A live writer got there first; that is the fresh state.
                tracing::debug!(check_id = %check.id, error = %e, "reconcile skipped");
            }
        }
    }
}
