//! Read-only query handlers: history, stats, rollups, alert budget usage.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use exit1_domain::subscription::ChannelKind;
use exit1_domain::tier::Tier;
use exit1_store::{CheckStore, OutcomeStore, RollupStore};

use crate::api::{api_error, domain_error};
use crate::service;
use crate::state::AppState;

fn d_limit() -> usize {
    100
}

#[derive(Deserialize)]
pub(crate) struct HistoryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "d_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Filter by derived status (`online`, `offline`, `degraded`, ...).
    #[serde(default)]
    pub status: Option<exit1_domain::check::CheckStatus>,
}

/// `GET /v1/checks/:id/history` — paginated outcome history, newest first.
pub(crate) async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params.from.unwrap_or(to - Duration::days(7));
    let limit = params.limit.min(1_000);

    let result = match params.status {
        // Status filters page after filtering, so fetch the window and
        // filter in-process (the store filter surface stays small).
        Some(status) => {
            let redirect_as_online = state
                .checks
                .get(&id)
                .await
                .map(|c| c.treat_redirect_as_online)
                .unwrap_or(true);
            state.outcomes.history(&id, from, to, usize::MAX, 0).await.map(|v| {
                v.into_iter()
                    .filter(|o| o.kind.status(redirect_as_online) == status)
                    .skip(params.offset)
                    .take(limit)
                    .collect::<Vec<_>>()
            })
        }
        None => state.outcomes.history(&id, from, to, limit, params.offset).await,
    };
    match result {
        Ok(outcomes) => Json(outcomes).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub(crate) struct RangeParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// `GET /v1/checks/:id/stats` — uptime %, mean, p50/p95 over a window.
pub(crate) async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Response {
    let to = params.to.unwrap_or_else(Utc::now);
    let from = params.from.unwrap_or(to - Duration::days(7));
    match service::stats(&state, &id, from, to).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => domain_error(e),
    }
}

/// `GET /v1/checks/:id/rollups` — materialized daily rollups.
pub(crate) async fn rollups(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Response {
    let to = params.to.unwrap_or_else(Utc::now).date_naive();
    let from = params
        .from
        .map(|d| d.date_naive())
        .unwrap_or(to - Duration::days(30));
    match state.rollups.list_for_check(&id, from, to).await {
        Ok(rows) => {
            let rows: Vec<serde_json::Value> = rows
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "day": r.day,
                        "total_probes": r.total_probes,
                        "failure_count": r.failure_count,
                        "has_issue": r.has_issue,
                        "worst_kind": r.worst_kind,
                        "mean_response_time_ms": r.mean_response_time_ms(),
                        "uptime_ratio": r.uptime_ratio(),
                    })
                })
                .collect();
            Json(rows).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub(crate) struct UsageParams {
    #[serde(default)]
    pub tier: Option<Tier>,
}

/// `GET /v1/usage/:user_id/:channel` — alert budget usage for both windows.
pub(crate) async fn usage(
    State(state): State<AppState>,
    Path((user_id, channel)): Path<(String, String)>,
    Query(params): Query<UsageParams>,
) -> Response {
    let channel = match channel.as_str() {
        "webhook" => ChannelKind::Webhook,
        "email" => ChannelKind::Email,
        "sms" => ChannelKind::Sms,
        other => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("unknown channel '{other}'"),
            )
        }
    };
    let tier = params.tier.unwrap_or_default();
    match state
        .dispatcher
        .budget_gate()
        .usage(&user_id, tier, channel, Utc::now())
        .await
    {
        Ok(u) => Json(serde_json::json!({
            "hourly": {
                "count": u.hourly_count,
                "max": u.hourly_max,
                "window": u.hourly_window_start_ms,
            },
            "monthly": {
                "count": u.monthly_count,
                "max": u.monthly_max,
                "window": u.monthly_window_start_ms,
            },
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
