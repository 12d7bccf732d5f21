//! Thin service wrappers around the stores and the pipeline: registration,
//! updates, manual probes, and read-side queries for the API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use exit1_domain::check::{
    Check, CheckStatus, ExpectedStatus, HttpMethod, RedirectPolicy,
};
use exit1_domain::outcome::ProbeOutcome;
use exit1_domain::region::Region;
use exit1_domain::tier::Tier;
use exit1_domain::{Error, Result};
use exit1_store::{CheckStore, OutcomeStore};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterCheckRequest {
    pub name: String,
    pub url: String,
    pub interval_seconds: u32,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub expected_status: Option<ExpectedStatus>,
    #[serde(default)]
    pub assert_body_contains: Option<String>,
    #[serde(default)]
    pub headers: Option<std::collections::HashMap<String, String>>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub redirect_policy: Option<RedirectPolicy>,
    #[serde(default)]
    pub ipv6_preferred: Option<bool>,
    #[serde(default)]
    pub tier: Option<Tier>,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub interval_seconds: Option<u32>,
    pub method: Option<HttpMethod>,
    pub expected_status: Option<ExpectedStatus>,
    pub assert_body_contains: Option<Option<String>>,
    pub headers: Option<std::collections::HashMap<String, String>>,
    pub request_body: Option<Option<String>>,
    pub region: Option<Region>,
    pub redirect_policy: Option<RedirectPolicy>,
    pub ipv6_preferred: Option<bool>,
    pub order_index: Option<i64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registration & lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Register a new check. Config violations are rejected here and never
/// reach the scheduler.
pub async fn register_check(
    state: &AppState,
    user_id: &str,
    req: RegisterCheckRequest,
) -> Result<Check> {
    let mut check = Check::new(user_id, &req.name, &req.url, req.interval_seconds);
    if let Some(v) = req.method {
        check.method = v;
    }
    if let Some(v) = req.expected_status {
        check.expected_status = v;
    }
    check.assert_body_contains = req.assert_body_contains;
    if let Some(v) = req.headers {
        check.headers = v;
    }
    check.request_body = req.request_body;
    if let Some(v) = req.region {
        check.region = v;
    }
    if let Some(v) = req.redirect_policy {
        check.redirect_policy = v;
    }
    if let Some(v) = req.ipv6_preferred {
        check.ipv6_preferred = v;
    }
    if let Some(v) = req.tier {
        check.tier = v;
    }

    check.validate(&state.config.worker.allowed_regions)?;
    state
        .checks
        .insert(check.clone())
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    tracing::info!(check_id = %check.id, user_id, url = %check.url, "check registered");
    Ok(check)
}

pub async fn update_check(state: &AppState, id: &str, patch: CheckPatch) -> Result<Check> {
    let mut check = get_check(state, id).await?;
    if let Some(v) = patch.name {
        check.name = v;
    }
    if let Some(v) = patch.url {
        check.url = v;
    }
    if let Some(v) = patch.interval_seconds {
        check.interval_seconds = v;
    }
    if let Some(v) = patch.method {
        check.method = v;
    }
    if let Some(v) = patch.expected_status {
        check.expected_status = v;
    }
    if let Some(v) = patch.assert_body_contains {
        check.assert_body_contains = v;
    }
    if let Some(v) = patch.headers {
        check.headers = v;
    }
    if let Some(v) = patch.request_body {
        check.request_body = v;
    }
    if let Some(v) = patch.region {
        check.region = v;
    }
    if let Some(v) = patch.redirect_policy {
        check.redirect_policy = v;
    }
    if let Some(v) = patch.ipv6_preferred {
        check.ipv6_preferred = v;
    }
    if let Some(v) = patch.order_index {
        check.order_index = v;
    }

    check.validate(&state.config.worker.allowed_regions)?;
    check.updated_at = Utc::now();
    state
        .checks
        .replace(check.clone())
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(check)
}

/// Delete a check and purge its history (user-requested purge is the only
/// path that removes outcomes).
pub async fn delete_check(state: &AppState, id: &str) -> Result<u64> {
    state
        .checks
        .delete(id)
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    let purged = state
        .outcomes
        .purge_check(id)
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    tracing::info!(check_id = %id, purged, "check deleted");
    Ok(purged)
}

/// Enable or pause a check. Re-enabling clears any disable state and makes
/// the check due immediately; the status restarts from `unknown`.
pub async fn toggle_enabled(state: &AppState, id: &str, enabled: bool) -> Result<Check> {
    let mut check = get_check(state, id).await?;
    let now = Utc::now();
    check.enabled = enabled;
    if enabled {
        check.disabled = false;
        check.disabled_at = None;
        check.disabled_reason = None;
        check.status = CheckStatus::Unknown;
        check.consecutive_failures = 0;
        check.first_failure_at = None;
        check.next_due_at = Some(now);
    } else {
        check.next_due_at = None;
    }
    check.updated_at = now;
    state
        .checks
        .replace(check.clone())
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(check)
}

/// Manually disable a check with a reason (sticky until re-enabled).
pub async fn disable_check(state: &AppState, id: &str, reason: &str) -> Result<Check> {
    let mut check = get_check(state, id).await?;
    let now = Utc::now();
    check.disabled = true;
    check.disabled_at = Some(now);
    check.disabled_reason = Some(reason.to_string());
    check.status = CheckStatus::Disabled;
    check.next_due_at = None;
    check.updated_at = now;
    state
        .checks
        .replace(check.clone())
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(check)
}

/// Run the pipeline once for this check, outside the scheduler. Disabled
/// checks are rejected; re-enable first.
pub async fn manual_probe(state: &AppState, id: &str) -> Result<ProbeOutcome> {
    let check = get_check(state, id).await?;
    if check.disabled {
        return Err(Error::Config(format!(
            "check {id} is disabled ({})",
            check.disabled_reason.as_deref().unwrap_or("manual")
        )));
    }
    crate::pipeline::run_pipeline(state, check)
        .await
        .ok_or_else(|| Error::Other("probe cancelled by shutdown".into()))
}

pub async fn get_check(state: &AppState, id: &str) -> Result<Check> {
    state
        .checks
        .get(id)
        .await
        .map_err(|e| Error::Other(e.to_string()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Read-side queries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct CheckStats {
    pub total_probes: u64,
    pub failures: u64,
    pub uptime_pct: f64,
    pub mean_response_time_ms: f64,
    pub p50_response_time_ms: u64,
    pub p95_response_time_ms: u64,
}

/// Uptime and latency stats over a history window, honoring the check's
/// redirect treatment.
pub async fn stats(
    state: &AppState,
    id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<CheckStats> {
    let redirect_as_online = get_check(state, id).await?.treat_redirect_as_online;
    let outcomes = state
        .outcomes
        .history(id, from, to, usize::MAX, 0)
        .await
        .map_err(|e| Error::Other(e.to_string()))?;

    let total = outcomes.len() as u64;
    let failures = outcomes
        .iter()
        .filter(|o| o.kind.is_failure(redirect_as_online))
        .count() as u64;
    let mut times: Vec<u64> = outcomes
        .iter()
        .filter(|o| !o.kind.is_failure(redirect_as_online))
        .map(|o| o.response_time_ms)
        .collect();
    times.sort_unstable();

    let mean = if times.is_empty() {
        0.0
    } else {
        times.iter().sum::<u64>() as f64 / times.len() as f64
    };
    Ok(CheckStats {
        total_probes: total,
        failures,
        uptime_pct: if total == 0 {
            100.0
        } else {
            (total - failures) as f64 * 100.0 / total as f64
        },
        mean_response_time_ms: mean,
        p50_response_time_ms: percentile(&times, 50),
        p95_response_time_ms: percentile(&times, 95),
    })
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], pct: u32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (sorted.len() as u64 * u64::from(pct)).div_ceil(100);
    let idx = (rank.max(1) - 1) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
