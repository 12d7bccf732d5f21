//! Non-blocking DNS resolver cache.
//!
//! Positive and negative caches with separate TTLs, single-flight
//! coalescing of concurrent resolutions, and transient-error retry where
//! each attempt leads with a different upstream provider. IP literals
//! short-circuit before any cache or upstream.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use exit1_domain::config::DnsConfig;
use exit1_domain::outcome::{IpFamily, ResolvedIp};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// NXDOMAIN. Permanent; cached with the longer negative TTL.
    #[error("name not found")]
    NameNotFound,
    /// The name exists but has no A/AAAA records. Permanent.
    #[error("no address records")]
    NoRecords,
    /// Refused, server failure, connection refused. Retried with rotation.
    #[error("transient dns failure: {0}")]
    Transient(String),
    /// Query deadline exceeded. Retried; reported as a timeout, never as
    /// success.
    #[error("dns timeout")]
    Timeout,
}

impl DnsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DnsError::Transient(_) | DnsError::Timeout)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Upstream lookup seam. `rotation` selects which upstream ordering the
/// attempt uses so successive retries lead with different providers.
#[async_trait]
pub trait ResolveBackend: Send + Sync {
    async fn lookup(
        &self,
        host: &str,
        family: IpFamily,
        rotation: usize,
    ) -> Result<Vec<IpAddr>, DnsError>;

    /// Best-effort PTR lookup for the enricher.
    async fn reverse(&self, _addr: IpAddr) -> Option<String> {
        None
    }
}

/// Production backend: one hickory resolver per upstream rotation.
pub struct HickoryBackend {
    resolvers: Vec<TokioAsyncResolver>,
}

impl HickoryBackend {
    pub fn new(config: &DnsConfig) -> Result<Self, DnsError> {
        let upstreams: Vec<IpAddr> = config
            .upstream_servers
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        if upstreams.is_empty() {
            return Err(DnsError::Transient("no usable upstream servers".into()));
        }

        let mut resolvers = Vec::with_capacity(upstreams.len());
        for rotation in 0..upstreams.len() {
            let mut rc = ResolverConfig::new();
            for i in 0..upstreams.len() {
                let addr = upstreams[(rotation + i) % upstreams.len()];
                rc.add_name_server(NameServerConfig::new(
                    std::net::SocketAddr::new(addr, 53),
                    Protocol::Udp,
                ));
            }
            let mut opts = ResolverOpts::default();
            opts.timeout = Duration::from_millis(config.per_query_timeout_ms);
            // Retry and caching are handled here, not inside hickory.
            opts.attempts = 1;
            opts.cache_size = 0;
            resolvers.push(TokioAsyncResolver::tokio(rc, opts));
        }
        Ok(Self { resolvers })
    }

    fn resolver(&self, rotation: usize) -> &TokioAsyncResolver {
        &self.resolvers[rotation % self.resolvers.len()]
    }
}

fn map_resolve_error(e: ResolveError) -> DnsError {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match response_code {
            ResponseCode::NXDomain => DnsError::NameNotFound,
            ResponseCode::NoError => DnsError::NoRecords,
            ResponseCode::Refused | ResponseCode::ServFail => {
                DnsError::Transient(format!("upstream answered {response_code}"))
            }
            other => DnsError::Transient(format!("upstream answered {other}")),
        },
        ResolveErrorKind::Timeout => DnsError::Timeout,
        other => DnsError::Transient(other.to_string()),
    }
}

#[async_trait]
impl ResolveBackend for HickoryBackend {
    async fn lookup(
        &self,
        host: &str,
        family: IpFamily,
        rotation: usize,
    ) -> Result<Vec<IpAddr>, DnsError> {
        let resolver = self.resolver(rotation);
        match family {
            IpFamily::V4 => resolver
                .ipv4_lookup(host)
                .await
                .map(|l| l.iter().map(|a| IpAddr::V4(a.0)).collect())
                .map_err(map_resolve_error),
            IpFamily::V6 => resolver
                .ipv6_lookup(host)
                .await
                .map(|l| l.iter().map(|a| IpAddr::V6(a.0)).collect())
                .map_err(map_resolve_error),
        }
    }

    async fn reverse(&self, addr: IpAddr) -> Option<String> {
        self.resolver(0)
            .reverse_lookup(addr)
            .await
            .ok()
            .and_then(|l| {
                l.iter()
                    .next()
                    .map(|ptr| ptr.0.to_string().trim_end_matches('.').to_string())
            })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct DnsStats {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub negative_hits: AtomicU64,
    pub coalesced: AtomicU64,
    pub retry_recovered: AtomicU64,
    pub evictions: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DnsStatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub negative_hits: u64,
    pub coalesced: u64,
    pub retry_recovered: u64,
    pub evictions: u64,
}

impl DnsStats {
    pub fn snapshot(&self) -> DnsStatsSnapshot {
        DnsStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            retry_recovered: self.retry_recovered.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolver cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PosEntry {
    addrs: Vec<ResolvedIp>,
    expires_at: Instant,
}

struct NegEntry {
    error: DnsError,
    expires_at: Instant,
}

type InflightResult = Result<Vec<ResolvedIp>, DnsError>;

pub struct ResolverCache {
    config: DnsConfig,
    backend: Arc<dyn ResolveBackend>,
    positive: DashMap<String, PosEntry>,
    negative: DashMap<String, NegEntry>,
    inflight: Mutex<HashMap<String, broadcast::Sender<InflightResult>>>,
    pub stats: DnsStats,
}

impl ResolverCache {
    pub fn new(config: DnsConfig, backend: Arc<dyn ResolveBackend>) -> Self {
        Self {
            config,
            backend,
            positive: DashMap::new(),
            negative: DashMap::new(),
            inflight: Mutex::new(HashMap::new()),
            stats: DnsStats::default(),
        }
    }

    /// Build the cache with the production hickory backend.
    pub fn from_config(config: DnsConfig) -> Result<Self, DnsError> {
        let backend = Arc::new(HickoryBackend::new(&config)?);
        Ok(Self::new(config, backend))
    }

    /// Resolve both address families, preferring cached results.
    ///
    /// Concurrent calls for the same host are coalesced: while one
    /// resolution is in flight, followers await its result instead of
    /// issuing their own upstream queries.
    pub async fn resolve_all(&self, host: &str) -> Result<Vec<ResolvedIp>, DnsError> {
        // IP literals never touch cache or upstream.
        if let Ok(addr) = host.parse::<IpAddr>() {
            return Ok(vec![ResolvedIp::from(addr)]);
        }
        let key = host.to_ascii_lowercase();
        let now = Instant::now();

        if let Some(entry) = self.positive.get(&key) {
            if entry.expires_at > now {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.addrs.clone());
            }
        }
        if let Some(entry) = self.negative.get(&key) {
            if entry.expires_at > now {
                self.stats.negative_hits.fetch_add(1, Ordering::Relaxed);
                return Err(entry.error.clone());
            }
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Single-flight: either join the in-flight resolution or lead one.
        let tx = {
            let mut inflight = self.inflight.lock().await;
            if let Some(tx) = inflight.get(&key) {
                let mut rx = tx.subscribe();
                drop(inflight);
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                match rx.recv().await {
                    Ok(result) => return result,
                    // Leader vanished (cancelled); fall through and lead.
                    Err(_) => return self.lead_resolution(&key).await,
                }
            }
            let (tx, _rx) = broadcast::channel(1);
            inflight.insert(key.clone(), tx.clone());
            tx
        };

        let result = self.resolve_upstream(&key).await;
        self.cache_result(&key, &result);
        let mut inflight = self.inflight.lock().await;
        inflight.remove(&key);
        let _ = tx.send(result.clone());
        drop(inflight);
        result
    }

    /// Single-result adaptation. When `family` is requested, addresses of
    /// that family win; otherwise IPv4 is preferred.
    pub async fn lookup(
        &self,
        host: &str,
        family: Option<IpFamily>,
    ) -> Result<IpAddr, DnsError> {
        let addrs = self.resolve_all(host).await?;
        let wanted = family.unwrap_or(IpFamily::V4);
        addrs
            .iter()
            .find(|a| a.family == wanted)
            .or_else(|| addrs.first())
            .map(|a| a.addr)
            .ok_or(DnsError::NoRecords)
    }

    /// Best-effort PTR lookup, via the backend.
    pub async fn reverse(&self, addr: IpAddr) -> Option<String> {
        self.backend.reverse(addr).await
    }

    /// Drop expired entries from both caches.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        let before = self.positive.len() + self.negative.len();
        self.positive.retain(|_, e| e.expires_at > now);
        self.negative.retain(|_, e| e.expires_at > now);
        let evicted = before.saturating_sub(self.positive.len() + self.negative.len());
        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "dns cache eviction sweep");
        }
    }

    /// Spawn the periodic eviction sweep (5 minutes by default).
    pub fn spawn_eviction(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_millis(self.config.evict_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick is a no-op
            loop {
                ticker.tick().await;
                self.evict_expired();
            }
        })
    }

    // ── Private ──────────────────────────────────────────────────────

    /// Late-leader path for followers whose leader was cancelled.
    async fn lead_resolution(&self, key: &str) -> InflightResult {
        let result = self.resolve_upstream(key).await;
        self.cache_result(key, &result);
        result
    }

    /// A and AAAA in parallel, with transient retry over rotated upstreams.
    async fn resolve_upstream(&self, host: &str) -> InflightResult {
        let max_attempts = 1 + self.config.max_retries as usize;
        let mut last_err = DnsError::Transient("no attempts made".into());

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = self
                    .config
                    .retry_backoff_ms
                    .get(attempt - 1)
                    .or(self.config.retry_backoff_ms.last())
                    .copied()
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let deadline = Duration::from_millis(self.config.per_query_timeout_ms);
            let (v4, v6) = tokio::join!(
                tokio::time::timeout(deadline, self.backend.lookup(host, IpFamily::V4, attempt)),
                tokio::time::timeout(deadline, self.backend.lookup(host, IpFamily::V6, attempt)),
            );
            let v4 = v4.unwrap_or(Err(DnsError::Timeout));
            let v6 = v6.unwrap_or(Err(DnsError::Timeout));

            match combine_families(v4, v6) {
                Ok(addrs) => {
                    if attempt > 0 {
                        self.stats.retry_recovered.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(host, attempt, "dns retry recovered");
                    }
                    return Ok(addrs);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn cache_result(&self, key: &str, result: &InflightResult) {
        let now = Instant::now();
        match result {
            Ok(addrs) => {
                self.positive.insert(
                    key.to_string(),
                    PosEntry {
                        addrs: addrs.clone(),
                        expires_at: now + Duration::from_millis(self.config.positive_ttl_ms),
                    },
                );
            }
            Err(e) => {
                let ttl = if e.is_transient() {
                    self.config.negative_ttl_transient_ms
                } else {
                    self.config.negative_ttl_permanent_ms
                };
                self.negative.insert(
                    key.to_string(),
                    NegEntry {
                        error: e.clone(),
                        expires_at: now + Duration::from_millis(ttl),
                    },
                );
            }
        }
    }
}

/// Union of the two family lookups, IPv4 first. Either family succeeding is
/// a success; NXDOMAIN from either is authoritative for the whole name.
fn combine_families(
    v4: Result<Vec<IpAddr>, DnsError>,
    v6: Result<Vec<IpAddr>, DnsError>,
) -> Result<Vec<ResolvedIp>, DnsError> {
    match (v4, v6) {
        (Ok(a), Ok(b)) => Ok(a.into_iter().chain(b).map(ResolvedIp::from).collect()),
        (Ok(a), Err(_)) if !a.is_empty() => Ok(a.into_iter().map(ResolvedIp::from).collect()),
        (Err(_), Ok(b)) if !b.is_empty() => Ok(b.into_iter().map(ResolvedIp::from).collect()),
        (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(e),
        (Err(DnsError::NameNotFound), Err(_)) | (Err(_), Err(DnsError::NameNotFound)) => {
            Err(DnsError::NameNotFound)
        }
        (Err(DnsError::NoRecords), Err(DnsError::NoRecords)) => Err(DnsError::NoRecords),
        // One family permanent-empty, the other transient: retryable.
        (Err(DnsError::NoRecords), Err(e)) | (Err(e), Err(DnsError::NoRecords)) => Err(e),
        (Err(e4), Err(_e6)) => Err(e4),
    }
}

/// Order addresses for connection: preferred family first, stable otherwise.
pub fn order_for_family(addrs: &[ResolvedIp], prefer_v6: bool) -> Vec<IpAddr> {
    let preferred = if prefer_v6 { IpFamily::V6 } else { IpFamily::V4 };
    let mut out: Vec<IpAddr> = addrs
        .iter()
        .filter(|a| a.family == preferred)
        .map(|a| a.addr)
        .collect();
    out.extend(
        addrs
            .iter()
            .filter(|a| a.family != preferred)
            .map(|a| a.addr),
    );
    out
}
