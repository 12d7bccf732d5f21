//! Scheduler — per-worker tick loop with region lock lease and a bounded
//! pipeline pool.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use exit1_store::{CheckStore, RegionLockStore};

use crate::metrics::Metrics;
use crate::state::AppState;

/// Run the tick loop until shutdown. Ticks never overlap: the next tick is
/// scheduled with a one-shot delay after the previous one completes, and a
/// tick that overran the interval starts the next one immediately.
pub async fn run(state: AppState) {
    let interval = Duration::from_millis(state.config.scheduler.tick_interval_ms);
    tracing::info!(
        region = %state.config.worker.region,
        tick_interval_ms = state.config.scheduler.tick_interval_ms,
        concurrency = state.config.scheduler.concurrency,
        "scheduler started"
    );

    while !state.shutdown.is_cancelled() {
        let started = Instant::now();
        tick(&state).await;
        Metrics::incr(&state.metrics.ticks_total);

        let elapsed = started.elapsed();
        if elapsed >= interval {
            let lag = (elapsed - interval).as_millis() as u64;
            state.metrics.tick_lag_ms.store(lag, Ordering::Relaxed);
            tracing::warn!(lag_ms = lag, "tick overran interval, starting next immediately");
            continue;
        }
        state.metrics.tick_lag_ms.store(0, Ordering::Relaxed);

        tokio::select! {
            _ = tokio::time::sleep(interval - elapsed) => {}
            _ = state.shutdown.cancelled() => break,
        }
    }
    tracing::info!("scheduler stopped");
}

/// One tick: lease the region lock, pull the due batch, fan out pipelines
/// under the concurrency bound, release. Any error is logged and the tick
/// completes; the next tick is scheduled normally.
pub async fn tick(state: &AppState) {
    let now = Utc::now();
    let region = &state.config.worker.region;

    let acquired = match state
        .locks
        .try_acquire(
            region,
            &state.worker_id,
            now,
            state.config.scheduler.lock_lease_ms,
        )
        .await
    {
        Ok(acquired) => acquired,
        Err(e) => {
            tracing::warn!(error = %e, "region lock store unavailable, skipping tick");
            return;
        }
    };
    if !acquired {
        Metrics::incr(&state.metrics.lock_not_acquired);
        tracing::info!(region = %region, "lock_not_acquired, skipping tick");
        return;
    }

    match state
        .checks
        .due_in_region(region, now, state.config.scheduler.batch_limit)
        .await
    {
        Ok(due) if due.is_empty() => {}
        Ok(due) => {
            tracing::debug!(count = due.len(), "dispatching due checks");
            let semaphore = Arc::new(Semaphore::new(state.config.scheduler.concurrency));
            let mut pool: JoinSet<()> = JoinSet::new();
            for check in due {
                if state.shutdown.is_cancelled() {
                    break;
                }
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let state = state.clone();
                pool.spawn(async move {
                    let _permit = permit;
                    crate::pipeline::run_pipeline(&state, check).await;
                });
            }
            while pool.join_next().await.is_some() {}
        }
        Err(e) => {
            tracing::warn!(error = %e, "due query failed");
        }
    }

    if let Err(e) = state.locks.release(region, &state.worker_id).await {
        tracing::warn!(error = %e, "region lock release failed (lease will expire)");
    }
}
