//! Read/CRUD API surface — thin wrappers over the service layer. The core
//! pipeline never depends on this module.

mod checks;
mod queries;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub(crate) fn domain_error(e: exit1_domain::Error) -> Response {
    use exit1_domain::Error;
    let status = match &e {
        Error::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Other(msg) if msg.contains("not found") => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/checks", post(checks::create).get(checks::list))
        .route(
            "/v1/checks/:id",
            get(checks::show).patch(checks::update).delete(checks::remove),
        )
        .route("/v1/checks/:id/toggle", post(checks::toggle))
        .route("/v1/checks/:id/probe", post(checks::probe))
        .route("/v1/checks/:id/history", get(queries::history))
        .route("/v1/checks/:id/stats", get(queries::stats))
        .route("/v1/checks/:id/rollups", get(queries::rollups))
        .route("/v1/usage/:user_id/:channel", get(queries::usage))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metricsz", get(metricsz))
        .merge(protected)
        .with_state(state)
}

/// Bearer-token auth. When no token is configured the check is skipped
/// (dev mode); otherwise the SHA-256 of the presented token must match the
/// startup-computed hash in constant time.
async fn require_api_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_token_hash else {
        return next.run(req).await;
    };
    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    let hash = Sha256::digest(presented.as_bytes());
    if hash.as_slice().ct_eq(expected.as_slice()).unwrap_u8() != 1 {
        return api_error(StatusCode::UNAUTHORIZED, "invalid or missing bearer token");
    }
    next.run(req).await
}

async fn healthz(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "region": state.config.worker.region,
        "worker_id": state.worker_id,
    }))
    .into_response()
}

async fn metricsz(State(state): State<AppState>) -> Response {
    let snapshot = state.metrics.snapshot(state.dns.stats.snapshot());
    Json(snapshot).into_response()
}
