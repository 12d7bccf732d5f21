//! Webhook channel delivery tests against local HTTP endpoints.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use parking_lot::Mutex;

use exit1_domain::check::{Check, CheckStatus};
use exit1_domain::event::{EventKind, TransitionEvent};
use exit1_domain::region::Region;
use exit1_domain::subscription::AlertSubscription;
use exit1_worker::alerts::webhook::{sign, WebhookChannel};

use common::fast_alerts;

fn event() -> TransitionEvent {
    TransitionEvent {
        kind: EventKind::WentOffline,
        check_id: "c1".into(),
        user_id: "u1".into(),
        region: Region::default(),
        at: Utc::now(),
        previous_status: CheckStatus::Online,
        new_status: CheckStatus::Offline,
        failures_at_emit: 2,
        last_error: Some("timeout".into()),
    }
}

fn sub_for(url: &str) -> AlertSubscription {
    let mut sub = AlertSubscription::new("u1");
    sub.webhook_url = Some(url.to_string());
    sub
}

/// Endpoint that fails with the given statuses before answering 200, and
/// records bodies + signature headers.
struct FlakyEndpoint {
    failures: Vec<u16>,
    hits: AtomicU32,
    seen: Mutex<Vec<(Option<String>, Vec<u8>)>>,
}

async fn flaky_handler(
    State(state): State<Arc<FlakyEndpoint>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) as usize;
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    state.seen.lock().push((signature, body.to_vec()));
    match state.failures.get(hit) {
        Some(status) => StatusCode::from_u16(*status).unwrap(),
        None => StatusCode::OK,
    }
}

async fn spawn_endpoint(failures: Vec<u16>) -> (String, Arc<FlakyEndpoint>) {
    let endpoint = Arc::new(FlakyEndpoint {
        failures,
        hits: AtomicU32::new(0),
        seen: Mutex::new(Vec::new()),
    });
    let app = axum::Router::new()
        .route("/hook", axum::routing::post(flaky_handler))
        .with_state(endpoint.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/hook"), endpoint)
}

#[tokio::test]
async fn retries_5xx_then_delivers() {
    let (url, endpoint) = spawn_endpoint(vec![500, 503]).await;
    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);

    channel.send(&sub_for(&url), &check, &event()).await.unwrap();
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_429_and_408() {
    let (url, endpoint) = spawn_endpoint(vec![429, 408]).await;
    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);

    channel.send(&sub_for(&url), &check, &event()).await.unwrap();
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_error_is_terminal() {
    let (url, endpoint) = spawn_endpoint(vec![404, 404, 404, 404]).await;
    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);

    let err = channel.send(&sub_for(&url), &check, &event()).await;
    assert!(err.is_err());
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 1, "no retry on 404");
}

#[tokio::test]
async fn exhausted_retries_fail() {
    let (url, endpoint) = spawn_endpoint(vec![500; 10]).await;
    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);

    let err = channel.send(&sub_for(&url), &check, &event()).await;
    assert!(err.is_err());
    // Initial attempt plus the configured three retries.
    assert_eq!(endpoint.hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn signature_covers_exact_body() {
    let (url, endpoint) = spawn_endpoint(vec![]).await;
    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);

    let mut sub = sub_for(&url);
    sub.webhook_secret = Some("s3cret".into());
    channel.send(&sub, &check, &event()).await.unwrap();

    let seen = endpoint.seen.lock();
    let (signature, body) = &seen[0];
    let signature = signature.as_deref().expect("X-Signature present");
    let expected = format!("sha256={}", sign("s3cret", body));
    assert_eq!(signature, expected);

    // The body is the documented payload shape.
    let payload: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(payload["event"], "went_offline");
    assert_eq!(payload["website"]["url"], "https://example.com");
}

#[tokio::test]
async fn unsigned_when_no_secret() {
    let (url, endpoint) = spawn_endpoint(vec![]).await;
    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);

    channel.send(&sub_for(&url), &check, &event()).await.unwrap();
    let seen = endpoint.seen.lock();
    assert!(seen[0].0.is_none(), "no signature header without a secret");
}

#[tokio::test]
async fn custom_subscription_headers_are_sent() {
    let headers_seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let capture = headers_seen.clone();
    let app = axum::Router::new().route(
        "/hook",
        axum::routing::post(move |headers: HeaderMap| {
            let capture = capture.clone();
            async move {
                *capture.lock() = headers
                    .get("x-team")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                StatusCode::OK
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let channel = WebhookChannel::new(fast_alerts()).unwrap();
    let check = Check::new("u1", "api", "https://example.com", 60);
    let mut sub = sub_for(&format!("http://{addr}/hook"));
    sub.webhook_headers.insert("x-team".into(), "sre".into());
    channel.send(&sub, &check, &event()).await.unwrap();

    assert_eq!(headers_seen.lock().as_deref(), Some("sre"));
}
