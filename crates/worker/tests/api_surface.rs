//! API surface tests over a live listener: CRUD wrappers, manual probe,
//! queries, and bearer-token auth.

mod common;

use std::sync::Arc;

use sha2::{Digest, Sha256};

use exit1_store::memory::MemoryStore;
use exit1_worker::api;
use exit1_worker::state::AppState;

use common::{test_state, ScriptedProber};

async fn serve(state: AppState) -> String {
    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn register_body() -> serde_json::Value {
    serde_json::json!({
        "user_id": "u1",
        "name": "api",
        "url": "https://example.com/health",
        "interval_seconds": 60,
    })
}

#[tokio::test]
async fn check_lifecycle_over_http() {
    let store = Arc::new(MemoryStore::new());
    let prober = ScriptedProber::new();
    let dir = tempfile::tempdir().unwrap();
    let base = serve(test_state(store, prober, dir.path(), |_| {})).await;
    let client = reqwest::Client::new();

    // Health first.
    let health = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    // Register.
    let created = client
        .post(format!("{base}/v1/checks"))
        .json(&register_body())
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let check: serde_json::Value = created.json().await.unwrap();
    let id = check["id"].as_str().unwrap().to_string();
    assert_eq!(check["status"], "unknown");

    // List for the owner.
    let list: serde_json::Value = client
        .get(format!("{base}/v1/checks?user_id=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Patch the name.
    let patched: serde_json::Value = client
        .patch(format!("{base}/v1/checks/{id}"))
        .json(&serde_json::json!({ "name": "api-prod" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(patched["name"], "api-prod");

    // Manual probe runs the pipeline once (scripted prober answers ok).
    let outcome: serde_json::Value = client
        .post(format!("{base}/v1/checks/{id}/probe"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["kind"], "ok");

    // History now has that probe.
    let history: serde_json::Value = client
        .get(format!("{base}/v1/checks/{id}/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    // Stats over the window.
    let stats: serde_json::Value = client
        .get(format!("{base}/v1/checks/{id}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_probes"], 1);
    assert_eq!(stats["uptime_pct"], 100.0);

    // Pause: no longer schedulable.
    let toggled: serde_json::Value = client
        .post(format!("{base}/v1/checks/{id}/toggle"))
        .json(&serde_json::json!({ "enabled": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["enabled"], false);
    assert!(toggled["next_due_at"].is_null());

    // Delete cascades to history purge.
    let deleted: serde_json::Value = client
        .delete(format!("{base}/v1/checks/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["purged_outcomes"], 1);

    let gone = client
        .get(format!("{base}/v1/checks/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn registration_rejections_are_422() {
    let store = Arc::new(MemoryStore::new());
    let prober = ScriptedProber::new();
    let dir = tempfile::tempdir().unwrap();
    let base = serve(test_state(store, prober, dir.path(), |_| {})).await;
    let client = reqwest::Client::new();

    let mut body = register_body();
    body["interval_seconds"] = serde_json::json!(5); // below the tier floor
    let resp = client
        .post(format!("{base}/v1/checks"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn usage_endpoint_reports_both_windows() {
    let store = Arc::new(MemoryStore::new());
    let prober = ScriptedProber::new();
    let dir = tempfile::tempdir().unwrap();
    let base = serve(test_state(store, prober, dir.path(), |_| {})).await;
    let client = reqwest::Client::new();

    let usage: serde_json::Value = client
        .get(format!("{base}/v1/usage/u1/webhook"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(usage["hourly"]["count"], 0);
    assert_eq!(usage["hourly"]["max"], 10); // free tier webhook cap
    assert_eq!(usage["monthly"]["count"], 0);

    let bad = client
        .get(format!("{base}/v1/usage/u1/carrier-pigeon"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
}

#[tokio::test]
async fn bearer_auth_guards_v1_routes() {
    let store = Arc::new(MemoryStore::new());
    let prober = ScriptedProber::new();
    let dir = tempfile::tempdir().unwrap();
    let mut state = test_state(store, prober, dir.path(), |_| {});
    state.api_token_hash = Some(Sha256::digest(b"s3cret").to_vec());
    let base = serve(state).await;
    let client = reqwest::Client::new();

    // Unauthenticated and wrong-token requests are rejected.
    let denied = client
        .get(format!("{base}/v1/checks?user_id=u1"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);

    let wrong = client
        .get(format!("{base}/v1/checks?user_id=u1"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let allowed = client
        .get(format!("{base}/v1/checks?user_id=u1"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);

    // Health stays public.
    let health = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(health.status(), 200);
}
