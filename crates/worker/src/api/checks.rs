//! Check CRUD handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use exit1_store::CheckStore;

use crate::api::{api_error, domain_error};
use crate::service;
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct CreateBody {
    pub user_id: String,
    #[serde(flatten)]
    pub config: service::RegisterCheckRequest,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Response {
    match service::register_check(&state, &body.user_id, body.config).await {
        Ok(check) => (StatusCode::CREATED, Json(check)).into_response(),
        Err(e) => domain_error(e),
    }
}

#[derive(Deserialize)]
pub(crate) struct ListParams {
    pub user_id: String,
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    match state.checks.list_for_user(&params.user_id).await {
        Ok(checks) => Json(checks).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(crate) async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.checks.get(&id).await {
        Ok(check) => Json(check).into_response(),
        Err(e) => api_error(StatusCode::NOT_FOUND, e.to_string()),
    }
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<service::CheckPatch>,
) -> Response {
    match service::update_check(&state, &id, patch).await {
        Ok(check) => Json(check).into_response(),
        Err(e) => domain_error(e),
    }
}

pub(crate) async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match service::delete_check(&state, &id).await {
        Ok(purged) => Json(serde_json::json!({ "deleted": id, "purged_outcomes": purged }))
            .into_response(),
        Err(e) => domain_error(e),
    }
}

#[derive(Deserialize)]
pub(crate) struct ToggleBody {
    pub enabled: bool,
}

pub(crate) async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> Response {
    match service::toggle_enabled(&state, &id, body.enabled).await {
        Ok(check) => Json(check).into_response(),
        Err(e) => domain_error(e),
    }
}

/// `POST /v1/checks/:id/probe` — run the pipeline once, outside the tick.
pub(crate) async fn probe(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match service::manual_probe(&state, &id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => domain_error(e),
    }
}
