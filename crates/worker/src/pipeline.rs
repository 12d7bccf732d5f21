//! One target end-to-end: probe → enrich → classify → persist → alert.
//!
//! The pipeline for one check is sequential; cancellation from worker
//! shutdown aborts the in-flight probe and records no outcome (the next
//! tick picks the check up again).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use exit1_domain::check::Check;
use exit1_domain::outcome::ProbeOutcome;
use exit1_domain::transition::apply_outcome;
use exit1_probe::Prober;

use crate::metrics::Metrics;
use crate::state::AppState;

/// Run the full pipeline for one check. Returns the recorded outcome, or
/// `None` when the probe was cancelled by shutdown.
pub async fn run_pipeline(state: &AppState, check: Check) -> Option<ProbeOutcome> {
    let now = Utc::now();
    Metrics::incr(&state.metrics.probes_total);

    let probe_and_enrich = async {
        let mut report = state.prober.probe(&check, now).await;
        state.enricher.enrich(&mut report).await;
        report
    };
    let report = tokio::select! {
        report = probe_and_enrich => report,
        _ = state.shutdown.cancelled() => {
            Metrics::incr(&state.metrics.probes_cancelled);
            tracing::debug!(check_id = %check.id, "probe cancelled, no outcome recorded");
            return None;
        }
    };

    if report.outcome.kind.is_failure(check.treat_redirect_as_online) {
        Metrics::incr(&state.metrics.probes_failed);
    }

    let transition = apply_outcome(&check, &report.outcome, now);
    if transition.auto_disable {
        Metrics::incr(&state.metrics.auto_disabled);
        tracing::info!(
            check_id = %check.id,
            consecutive_failures = transition.consecutive_failures,
            "check auto-disabled after sustained failure"
        );
    }

    let next_due = jittered_next_due(
        now,
        check.interval_seconds,
        state.config.scheduler.jitter_pct,
    );
    let updated = state
        .sink
        .record(&check, &transition, &report.outcome, next_due)
        .await;

    if let Some(event) = &transition.event {
        state.dispatcher.dispatch_event(&updated, event, now).await;
    }

    Some(report.outcome)
}

/// `next_due = now + interval ± jitter` to spread synchronized targets.
pub fn jittered_next_due(
    now: DateTime<Utc>,
    interval_seconds: u32,
    jitter_pct: u8,
) -> DateTime<Utc> {
    let interval_ms = i64::from(interval_seconds) * 1000;
    let span = interval_ms * i64::from(jitter_pct) / 100;
    let offset = if span > 0 {
        rand::thread_rng().gen_range(-span..=span)
    } else {
        0
    };
    now + Duration::milliseconds(interval_ms + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_ten_percent() {
        let now = Utc::now();
        for _ in 0..200 {
            let due = jittered_next_due(now, 60, 10);
            let delta_ms = (due - now).num_milliseconds();
            assert!((54_000..=66_000).contains(&delta_ms), "got {delta_ms}");
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let now = Utc::now();
        let due = jittered_next_due(now, 60, 0);
        assert_eq!((due - now).num_milliseconds(), 60_000);
    }
}
