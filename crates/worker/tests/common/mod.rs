//! Shared fixtures for worker integration tests: a scripted prober, a
//! no-op DNS backend, state construction, and a local webhook sink.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use exit1_domain::check::Check;
use exit1_domain::config::{AlertsConfig, Config};
use exit1_domain::outcome::{IpFamily, OutcomeKind, ProbeOutcome};
use exit1_probe::dns::{DnsError, ResolveBackend, ResolverCache};
use exit1_probe::enrich::Enricher;
use exit1_probe::{ProbeReport, Prober};
use exit1_store::memory::MemoryStore;
use exit1_store::queue::DurableQueue;
use exit1_worker::alerts::Dispatcher;
use exit1_worker::metrics::Metrics;
use exit1_worker::sink::ResultSink;
use exit1_worker::state::AppState;

pub struct NoopBackend;

#[async_trait]
impl ResolveBackend for NoopBackend {
    async fn lookup(
        &self,
        _host: &str,
        _family: IpFamily,
        _rotation: usize,
    ) -> Result<Vec<IpAddr>, DnsError> {
        Err(DnsError::NoRecords)
    }
}

/// Prober that replays a scripted outcome sequence per check id. Checks
/// without a script answer `ok`. Call counts are recorded per check.
#[derive(Default)]
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, VecDeque<OutcomeKind>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, check_id: &str, kinds: &[OutcomeKind]) {
        self.scripts
            .lock()
            .insert(check_id.to_string(), kinds.iter().copied().collect());
    }

    pub fn calls_for(&self, check_id: &str) -> u32 {
        self.calls.lock().get(check_id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, check: &Check, now: DateTime<Utc>) -> ProbeReport {
        *self.calls.lock().entry(check.id.clone()).or_insert(0) += 1;
        let kind = self
            .scripts
            .lock()
            .get_mut(&check.id)
            .and_then(|q| q.pop_front())
            .unwrap_or(OutcomeKind::Ok);

        let mut outcome =
            ProbeOutcome::begin(&check.id, &check.user_id, check.region.clone(), now);
        outcome.kind = kind;
        outcome.response_time_ms = 10;
        outcome.status_code = match kind {
            OutcomeKind::Ok | OutcomeKind::AssertionFailed => Some(200),
            OutcomeKind::HttpError => Some(500),
            OutcomeKind::Redirect => Some(301),
            _ => None,
        };
        if kind.is_failure(true) && outcome.status_code.is_none() {
            outcome.error_message = Some(format!("{kind:?}").to_lowercase());
        }
        ProbeReport { outcome, headers: Vec::new() }
    }
}

/// Build a full worker state over the in-memory store and a scripted
/// prober. `mutate` tweaks the config before it is frozen.
pub fn test_state(
    store: Arc<MemoryStore>,
    prober: Arc<dyn Prober>,
    state_dir: &std::path::Path,
    mutate: impl FnOnce(&mut Config),
) -> AppState {
    let mut config = Config::default();
    config.scheduler.tick_interval_ms = 50;
    config.worker.state_path = state_dir.to_path_buf();
    mutate(&mut config);
    let config = Arc::new(config);

    let metrics = Arc::new(Metrics::default());
    let dns = Arc::new(ResolverCache::new(
        config.dns.clone(),
        Arc::new(NoopBackend),
    ));
    let enricher = Arc::new(Enricher::new(&config.geoip, Arc::clone(&dns)));
    let sink = Arc::new(ResultSink::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(DurableQueue::new(state_dir)),
        metrics.clone(),
    ));
    let dispatcher = Arc::new(
        Dispatcher::new(
            store.clone(),
            store.clone(),
            config.alerts.clone(),
            metrics.clone(),
        )
        .unwrap(),
    );

    AppState {
        config,
        worker_id: format!("test-{}", uuid::Uuid::new_v4().simple()),
        shutdown: CancellationToken::new(),
        checks: store.clone(),
        outcomes: store.clone(),
        rollups: store.clone(),
        subscriptions: store.clone(),
        budgets: store.clone(),
        locks: store,
        dns,
        prober,
        enricher,
        sink,
        dispatcher,
        metrics,
        api_token_hash: None,
    }
}

/// Default alerts config with fast webhook retries for tests.
pub fn fast_alerts() -> AlertsConfig {
    AlertsConfig {
        webhook_retry_backoff_ms: vec![1, 1, 1],
        ..AlertsConfig::default()
    }
}

/// Force a check to be due now (the pipeline pushes `next_due` into the
/// future after every probe).
pub async fn force_due(store: &MemoryStore, id: &str) {
    use exit1_store::CheckStore;
    let mut check = store.get(id).await.unwrap();
    check.next_due_at = Some(Utc::now() - Duration::seconds(1));
    store.replace(check).await.unwrap();
}

/// Local webhook sink: records every JSON body it receives, answering 200.
pub async fn webhook_sink() -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
    let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let app = axum::Router::new().route(
        "/hook",
        axum::routing::post(move |body: axum::Json<serde_json::Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().push(body.0);
                axum::http::StatusCode::OK
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/hook"), received)
}
