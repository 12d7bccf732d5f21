use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use exit1_domain::config::Config;
use exit1_probe::dns::ResolverCache;
use exit1_probe::enrich::Enricher;
use exit1_probe::Prober;
use exit1_store::{
    BudgetStore, CheckStore, OutcomeStore, RegionLockStore, RollupStore, SubscriptionStore,
};

use crate::alerts::Dispatcher;
use crate::metrics::Metrics;
use crate::sink::ResultSink;

/// Shared worker state passed to the scheduler, the aggregator, and the API
/// handlers.
///
/// Fields are grouped by concern:
/// - **Config & identity** — config, worker id, shutdown token
/// - **Stores** — repository handles into the document database
/// - **Probe stack** — DNS cache, prober, enricher
/// - **Pipeline services** — sink, dispatcher, metrics
#[derive(Clone)]
pub struct AppState {
    // ── Config & identity ─────────────────────────────────────────────
    pub config: Arc<Config>,
    /// Unique id of this worker process (lock holder id).
    pub worker_id: String,
    pub shutdown: CancellationToken,

    // ── Stores ────────────────────────────────────────────────────────
    pub checks: Arc<dyn CheckStore>,
    pub outcomes: Arc<dyn OutcomeStore>,
    pub rollups: Arc<dyn RollupStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub budgets: Arc<dyn BudgetStore>,
    pub locks: Arc<dyn RegionLockStore>,

    // ── Probe stack ───────────────────────────────────────────────────
    pub dns: Arc<ResolverCache>,
    pub prober: Arc<dyn Prober>,
    pub enricher: Arc<Enricher>,

    // ── Pipeline services ─────────────────────────────────────────────
    pub sink: Arc<ResultSink>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
