//! Outcome classifier & state machine.
//!
//! Maps (previous check state, new probe outcome) to the new state, an
//! optional transition event, and an optional auto-disable action. The
//! caller invokes this strictly serially per check, so emitted events for a
//! given check are totally ordered.

use chrono::{DateTime, Duration, Utc};

use crate::check::{Check, CheckStatus};
use crate::event::{EventKind, TransitionEvent};
use crate::outcome::{OutcomeKind, ProbeOutcome};

/// Sustained-failure window after which a check is disabled automatically.
pub const AUTO_DISABLE_DAYS: i64 = 7;

/// Result of classifying one outcome against the previous state.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub status: CheckStatus,
    pub consecutive_failures: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub event: Option<TransitionEvent>,
    /// Set when the sustained-failure window elapsed: the sink must mark
    /// the check disabled and the scheduler stops picking it up.
    pub auto_disable: bool,
}

/// Classify `outcome` against the check's current state. The check's
/// `treat_redirect_as_online` flag decides whether a flagged redirect
/// counts as uptime or as a degraded response.
pub fn apply_outcome(check: &Check, outcome: &ProbeOutcome, now: DateTime<Utc>) -> Transition {
    let redirect_as_online = check.treat_redirect_as_online;
    let prev = check.status;
    let new = outcome.kind.status(redirect_as_online);
    let error = if outcome.kind == OutcomeKind::Redirect && !redirect_as_online {
        Some(match outcome.status_code {
            Some(code) => format!("unexpected redirect ({code})"),
            None => "unexpected redirect".to_string(),
        })
    } else {
        outcome.short_error()
    };

    let mut t = Transition {
        status: new,
        consecutive_failures: check.consecutive_failures,
        first_failure_at: check.first_failure_at,
        last_error: error.clone(),
        event: None,
        auto_disable: false,
    };

    let event = |kind: EventKind, failures: u32, t: &Transition| TransitionEvent {
        kind,
        check_id: check.id.clone(),
        user_id: check.user_id.clone(),
        region: check.region.clone(),
        at: now,
        previous_status: prev,
        new_status: t.status,
        failures_at_emit: failures,
        last_error: t.last_error.clone(),
    };

    if new == prev {
        // Same status: never an event, only counter bookkeeping.
        if new.is_failing() {
            t.consecutive_failures = check.consecutive_failures.saturating_add(1);
        } else {
            t.consecutive_failures = 0;
            t.first_failure_at = None;
            t.last_error = None;
        }
    } else if new.is_failing() && prev.is_failing() {
        // degraded ↔ offline: still one incident. Emit error_observed only
        // when the failure mode actually changed.
        t.consecutive_failures = check.consecutive_failures.saturating_add(1);
        if t.last_error != check.last_error {
            t.event = Some(event(EventKind::ErrorObserved, t.consecutive_failures, &t));
        }
    } else if new.is_failing() {
        // online / redirect / unknown → failing.
        t.consecutive_failures = 1;
        if t.first_failure_at.is_none() {
            t.first_failure_at = Some(now);
        }
        t.event = Some(event(EventKind::WentOffline, 1, &t));
    } else if prev.is_failing() {
        // Recovery. The event carries the pre-recovery failure count so
        // alert thresholds apply after the reset.
        let failures_before = check.consecutive_failures;
        t.consecutive_failures = 0;
        t.first_failure_at = None;
        t.last_error = None;
        t.event = Some(event(EventKind::CameOnline, failures_before, &t));
    } else {
        // unknown → online / redirect: first result, nothing to announce.
        t.consecutive_failures = 0;
        t.first_failure_at = None;
        t.last_error = None;
    }

    // Sustained-failure auto-disable, evaluated on the post-transition state.
    if t.consecutive_failures > 0 {
        if let Some(first) = t.first_failure_at {
            if now - first >= Duration::days(AUTO_DISABLE_DAYS) {
                t.auto_disable = true;
                t.status = CheckStatus::Disabled;
                t.event = Some(event(EventKind::AutoDisabled, t.consecutive_failures, &t));
            }
        }
    }

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeKind;
    use crate::region::Region;

    fn check_with(status: CheckStatus, failures: u32) -> Check {
        let mut c = Check::new("u1", "api", "https://example.com", 60);
        c.status = status;
        c.consecutive_failures = failures;
        if failures > 0 {
            c.first_failure_at = Some(Utc::now() - Duration::minutes(failures as i64));
            c.last_error = Some("timeout".into());
        }
        c
    }

    fn outcome_of(kind: OutcomeKind) -> ProbeOutcome {
        let mut o = ProbeOutcome::begin("c1", "u1", Region::default(), Utc::now());
        o.kind = kind;
        if kind == OutcomeKind::HttpError {
            o.status_code = Some(500);
        }
        o
    }

    #[test]
    fn steady_online_no_event() {
        let c = check_with(CheckStatus::Online, 0);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Ok), Utc::now());
        assert_eq!(t.status, CheckStatus::Online);
        assert_eq!(t.consecutive_failures, 0);
        assert!(t.event.is_none());
        assert!(!t.auto_disable);
    }

    #[test]
    fn first_failure_emits_went_offline() {
        let c = check_with(CheckStatus::Online, 0);
        let now = Utc::now();
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Timeout), now);
        assert_eq!(t.status, CheckStatus::Offline);
        assert_eq!(t.consecutive_failures, 1);
        assert_eq!(t.first_failure_at, Some(now));
        let e = t.event.unwrap();
        assert_eq!(e.kind, EventKind::WentOffline);
        assert_eq!(e.failures_at_emit, 1);
        assert_eq!(e.previous_status, CheckStatus::Online);
        assert_eq!(e.new_status, CheckStatus::Offline);
    }

    #[test]
    fn unknown_to_failing_emits_went_offline() {
        let c = check_with(CheckStatus::Unknown, 0);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::ConnectFailure), Utc::now());
        assert_eq!(t.event.unwrap().kind, EventKind::WentOffline);
    }

    #[test]
    fn unknown_to_online_is_silent() {
        let c = check_with(CheckStatus::Unknown, 0);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Ok), Utc::now());
        assert!(t.event.is_none());
        assert_eq!(t.status, CheckStatus::Online);
    }

    #[test]
    fn repeat_failure_increments_without_event() {
        let c = check_with(CheckStatus::Offline, 3);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Timeout), Utc::now());
        assert_eq!(t.consecutive_failures, 4);
        assert!(t.event.is_none());
        assert!(t.first_failure_at.is_some());
    }

    #[test]
    fn recovery_emits_came_online_with_prior_count() {
        let c = check_with(CheckStatus::Offline, 3);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Ok), Utc::now());
        assert_eq!(t.status, CheckStatus::Online);
        assert_eq!(t.consecutive_failures, 0);
        assert!(t.first_failure_at.is_none());
        let e = t.event.unwrap();
        assert_eq!(e.kind, EventKind::CameOnline);
        assert_eq!(e.failures_at_emit, 3);
    }

    #[test]
    fn redirect_recovery_counts_as_online() {
        let c = check_with(CheckStatus::Degraded, 2);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Redirect), Utc::now());
        assert_eq!(t.status, CheckStatus::Redirect);
        assert_eq!(t.event.unwrap().kind, EventKind::CameOnline);
    }

    #[test]
    fn disallowed_redirect_is_a_failure() {
        let mut c = check_with(CheckStatus::Online, 0);
        c.treat_redirect_as_online = false;
        let mut o = outcome_of(OutcomeKind::Redirect);
        o.status_code = Some(301);
        let t = apply_outcome(&c, &o, Utc::now());
        assert_eq!(t.status, CheckStatus::Degraded);
        assert_eq!(t.consecutive_failures, 1);
        assert_eq!(t.last_error.as_deref(), Some("unexpected redirect (301)"));
        assert_eq!(t.event.unwrap().kind, EventKind::WentOffline);
    }

    #[test]
    fn disallowed_redirect_repeats_without_event() {
        let mut c = check_with(CheckStatus::Degraded, 2);
        c.treat_redirect_as_online = false;
        c.last_error = Some("unexpected redirect (301)".into());
        let mut o = outcome_of(OutcomeKind::Redirect);
        o.status_code = Some(301);
        let t = apply_outcome(&c, &o, Utc::now());
        assert_eq!(t.status, CheckStatus::Degraded);
        assert_eq!(t.consecutive_failures, 3);
        assert!(t.event.is_none());
    }

    #[test]
    fn degraded_to_offline_same_error_is_silent() {
        let mut c = check_with(CheckStatus::Degraded, 2);
        c.last_error = Some("timeout".into());
        let mut o = outcome_of(OutcomeKind::Timeout);
        o.error_message = None;
        // short_error() for a bare timeout is "timeout" — same as stored.
        let t = apply_outcome(&c, &o, Utc::now());
        assert_eq!(t.consecutive_failures, 3);
        assert!(t.event.is_none(), "no went_offline repeat, no error_observed");
    }

    #[test]
    fn degraded_to_offline_new_error_emits_error_observed() {
        let mut c = check_with(CheckStatus::Degraded, 2);
        c.last_error = Some("unexpected status (500)".into());
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Timeout), Utc::now());
        let e = t.event.unwrap();
        assert_eq!(e.kind, EventKind::ErrorObserved);
        assert_eq!(e.failures_at_emit, 3);
    }

    #[test]
    fn status_change_within_failure_keeps_first_failure_time() {
        let first = Utc::now() - Duration::hours(1);
        let mut c = check_with(CheckStatus::Offline, 5);
        c.first_failure_at = Some(first);
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::HttpError), Utc::now());
        assert_eq!(t.status, CheckStatus::Degraded);
        assert_eq!(t.first_failure_at, Some(first));
    }

    #[test]
    fn auto_disable_after_sustained_failure() {
        let now = Utc::now();
        let mut c = check_with(CheckStatus::Offline, 10_000);
        c.first_failure_at = Some(now - Duration::days(AUTO_DISABLE_DAYS));
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Timeout), now);
        assert!(t.auto_disable);
        assert_eq!(t.status, CheckStatus::Disabled);
        let e = t.event.unwrap();
        assert_eq!(e.kind, EventKind::AutoDisabled);
        assert_eq!(e.new_status, CheckStatus::Disabled);
    }

    #[test]
    fn no_auto_disable_one_second_early() {
        let now = Utc::now();
        let mut c = check_with(CheckStatus::Offline, 10_000);
        c.first_failure_at = Some(now - Duration::days(AUTO_DISABLE_DAYS) + Duration::seconds(1));
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Timeout), now);
        assert!(!t.auto_disable);
        assert_eq!(t.status, CheckStatus::Offline);
    }

    #[test]
    fn recovery_prevents_auto_disable() {
        let now = Utc::now();
        let mut c = check_with(CheckStatus::Offline, 10_000);
        c.first_failure_at = Some(now - Duration::days(AUTO_DISABLE_DAYS * 2));
        let t = apply_outcome(&c, &outcome_of(OutcomeKind::Ok), now);
        assert!(!t.auto_disable);
        assert_eq!(t.status, CheckStatus::Online);
        assert_eq!(t.event.unwrap().kind, EventKind::CameOnline);
    }

    /// Determinism: replaying the same outcome sequence yields identical
    /// events (persistence retries restart with fresh inputs).
    #[test]
    fn event_stream_is_deterministic() {
        let kinds = [
            OutcomeKind::Ok,
            OutcomeKind::Ok,
            OutcomeKind::Timeout,
            OutcomeKind::Timeout,
            OutcomeKind::HttpError,
            OutcomeKind::Ok,
        ];
        let now = Utc::now();

        let run = || {
            let mut c = check_with(CheckStatus::Unknown, 0);
            let mut events = Vec::new();
            for (i, kind) in kinds.iter().enumerate() {
                let at = now + Duration::seconds(60 * i as i64);
                let mut o = outcome_of(*kind);
                o.at = at;
                let t = apply_outcome(&c, &o, at);
                c.status = t.status;
                c.consecutive_failures = t.consecutive_failures;
                c.first_failure_at = t.first_failure_at;
                c.last_error = t.last_error.clone();
                if let Some(e) = t.event {
                    events.push(e.kind);
                }
            }
            events
        };

        let a = run();
        let b = run();
        assert_eq!(a, b);
        assert_eq!(
            a,
            vec![EventKind::WentOffline, EventKind::ErrorObserved, EventKind::CameOnline]
        );
    }
}
