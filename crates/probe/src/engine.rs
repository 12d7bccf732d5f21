//! HTTP probe engine — executes one probe against one target and produces
//! a classified outcome. Network failures never escape as errors; they
//! become outcome kinds for the state machine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::redirect;

use exit1_domain::check::{Check, HttpMethod, RedirectPolicy};
use exit1_domain::config::HttpProbeConfig;
use exit1_domain::outcome::{IpFamily, OutcomeKind, ProbeErrorCode, ProbeOutcome};

use crate::dns::{order_for_family, DnsError, ResolverCache};
use crate::{ProbeReport, Prober};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DNS bridge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Routes reqwest's hostname lookups through the shared resolver cache.
/// The explicit `resolve_all` in `probe` warms the cache, so the request
/// itself never triggers a second upstream query.
struct CacheDnsResolver {
    cache: Arc<ResolverCache>,
    prefer_v6: bool,
}

impl Resolve for CacheDnsResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = Arc::clone(&self.cache);
        let prefer_v6 = self.prefer_v6;
        Box::pin(async move {
            let addrs = cache
                .resolve_all(name.as_str())
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            let ordered = order_for_family(&addrs, prefer_v6);
            let socket_addrs: Addrs =
                Box::new(ordered.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(socket_addrs)
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client matrix: redirect policy × preferred address family, built once
/// and shared by every pipeline.
pub struct ProbeEngine {
    config: HttpProbeConfig,
    dns: Arc<ResolverCache>,
    follow_v4: reqwest::Client,
    follow_v6: reqwest::Client,
    none_v4: reqwest::Client,
    none_v6: reqwest::Client,
}

impl ProbeEngine {
    pub fn new(
        config: HttpProbeConfig,
        dns: Arc<ResolverCache>,
    ) -> Result<Self, exit1_domain::Error> {
        let build = |policy: redirect::Policy, prefer_v6: bool| {
            reqwest::Client::builder()
                .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
                .timeout(Duration::from_millis(config.total_timeout_ms))
                .redirect(policy)
                .dns_resolver(Arc::new(CacheDnsResolver {
                    cache: Arc::clone(&dns),
                    prefer_v6,
                }))
                .build()
                .map_err(|e| exit1_domain::Error::Http(e.to_string()))
        };

        Ok(Self {
            follow_v4: build(redirect::Policy::limited(config.max_redirects), false)?,
            follow_v6: build(redirect::Policy::limited(config.max_redirects), true)?,
            none_v4: build(redirect::Policy::none(), false)?,
            none_v6: build(redirect::Policy::none(), true)?,
            config,
            dns,
        })
    }

    fn client_for(&self, check: &Check) -> &reqwest::Client {
        match (check.redirect_policy, check.ipv6_preferred) {
            (RedirectPolicy::Follow, false) => &self.follow_v4,
            (RedirectPolicy::Follow, true) => &self.follow_v6,
            (RedirectPolicy::Flag, false) => &self.none_v4,
            (RedirectPolicy::Flag, true) => &self.none_v6,
        }
    }

    fn method_of(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }

    fn request_headers(&self, check: &Check) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.config.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        for (name, value) in &check.headers {
            let parsed = (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => {
                    tracing::warn!(check_id = %check.id, header = %name, "skipping invalid header");
                }
            }
        }
        headers
    }

    /// Read the body stream up to the configured cap; the rest of the
    /// stream is dropped with the connection.
    async fn read_capped_body(&self, resp: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
        let cap = self.config.max_response_bytes;
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let room = cap.saturating_sub(buf.len());
            if room == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if buf.len() >= cap {
                break;
            }
        }
        Ok(buf)
    }
}

#[async_trait]
impl Prober for ProbeEngine {
    async fn probe(&self, check: &Check, now: DateTime<Utc>) -> ProbeReport {
        let mut outcome =
            ProbeOutcome::begin(&check.id, &check.user_id, check.region.clone(), now);
        let started = Instant::now();

        // Resolve explicitly so the outcome records addresses and DNS
        // failures classify before any connection attempt. The request
        // below re-reads the warmed cache through the client's resolver.
        let url = match reqwest::Url::parse(&check.url) {
            Ok(u) => u,
            Err(e) => {
                outcome.kind = OutcomeKind::UnknownError;
                outcome.error_code = Some(ProbeErrorCode::Protocol);
                outcome.error_message = Some(format!("invalid url: {e}"));
                return ProbeReport { outcome, headers: Vec::new() };
            }
        };
        if let Some(host) = url.host_str() {
            match self.dns.resolve_all(host).await {
                Ok(addrs) => {
                    let preferred = if check.ipv6_preferred {
                        IpFamily::V6
                    } else {
                        IpFamily::V4
                    };
                    outcome.ip_family = addrs
                        .iter()
                        .find(|a| a.family == preferred)
                        .or_else(|| addrs.first())
                        .map(|a| a.family);
                    outcome.resolved_ips = addrs;
                }
                Err(e) => {
                    finish_dns_failure(&mut outcome, e, started);
                    return ProbeReport { outcome, headers: Vec::new() };
                }
            }
        }
        outcome.timing.pre_connect_ms = started.elapsed().as_millis() as u64;

        // Build and send the request.
        let mut req = self
            .client_for(check)
            .request(Self::method_of(check.method), url)
            .headers(self.request_headers(check));
        if let Some(body) = &check.request_body {
            req = req.body(body.clone());
        }

        let send_started = Instant::now();
        let response = req.send().await;

        let headers = match response {
            Ok(resp) => {
                outcome.timing.ttfb_ms = send_started.elapsed().as_millis() as u64;
                let status = resp.status().as_u16();
                outcome.status_code = Some(status);
                let headers: Vec<(String, String)> = resp
                    .headers()
                    .iter()
                    .map(|(n, v)| {
                        (n.as_str().to_string(), v.to_str().unwrap_or_default().to_string())
                    })
                    .collect();

                if check.redirect_policy == RedirectPolicy::Flag && (300..400).contains(&status) {
                    outcome.kind = OutcomeKind::Redirect;
                } else {
                    match self.read_capped_body(resp).await {
                        Ok(body) => {
                            outcome.kind = classify_response(
                                status,
                                &check.expected_status,
                                check.assert_body_contains.as_deref(),
                                &body,
                            );
                            if outcome.kind == OutcomeKind::HttpError {
                                outcome.error_message =
                                    Some(format!("unexpected status {status}"));
                            } else if outcome.kind == OutcomeKind::AssertionFailed {
                                outcome.error_message =
                                    Some("response body assertion failed".into());
                            }
                        }
                        Err(e) => classify_request_error(&mut outcome, &e),
                    }
                }
                headers
            }
            Err(e) => {
                classify_request_error(&mut outcome, &e);
                Vec::new()
            }
        };

        outcome.timing.total_ms = started.elapsed().as_millis() as u64;
        outcome.response_time_ms = outcome.timing.total_ms;
        ProbeReport { outcome, headers }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn finish_dns_failure(outcome: &mut ProbeOutcome, e: DnsError, started: Instant) {
    outcome.kind = OutcomeKind::DnsFailure;
    outcome.error_code = Some(match e {
        DnsError::NameNotFound | DnsError::NoRecords => ProbeErrorCode::NameNotFound,
        DnsError::Transient(_) => ProbeErrorCode::TransientDns,
        DnsError::Timeout => ProbeErrorCode::Timeout,
    });
    outcome.error_message = Some(e.to_string());
    outcome.timing.pre_connect_ms = started.elapsed().as_millis() as u64;
    outcome.timing.total_ms = outcome.timing.pre_connect_ms;
    outcome.response_time_ms = outcome.timing.total_ms;
}

/// Classify a completed response against the check's expectations.
fn classify_response(
    status: u16,
    expected: &exit1_domain::check::ExpectedStatus,
    assertion: Option<&str>,
    body: &[u8],
) -> OutcomeKind {
    if !expected.matches(status) {
        return OutcomeKind::HttpError;
    }
    if let Some(needle) = assertion {
        let haystack = String::from_utf8_lossy(body);
        if !haystack.contains(needle) {
            return OutcomeKind::AssertionFailed;
        }
    }
    OutcomeKind::Ok
}

/// Map a reqwest transport error onto the outcome taxonomy.
fn classify_request_error(outcome: &mut ProbeOutcome, e: &reqwest::Error) {
    let chain = error_chain(e);
    if e.is_timeout() {
        outcome.kind = OutcomeKind::Timeout;
        outcome.error_code = Some(ProbeErrorCode::Timeout);
    } else if is_tls_error(&chain) {
        outcome.kind = OutcomeKind::TlsFailure;
        outcome.error_code = Some(ProbeErrorCode::TlsInvalid);
    } else if e.is_connect() {
        outcome.kind = OutcomeKind::ConnectFailure;
        outcome.error_code = Some(connect_error_code(&chain));
    } else if e.is_redirect() {
        // Redirect loop / hop limit exceeded while following.
        outcome.kind = OutcomeKind::HttpError;
        outcome.error_code = Some(ProbeErrorCode::Protocol);
    } else {
        outcome.kind = OutcomeKind::UnknownError;
        outcome.error_code = Some(ProbeErrorCode::Io);
    }
    outcome.error_message = Some(truncate(&chain, 240));
}

/// Full source-chain text, lowercased for matching.
fn error_chain(e: &reqwest::Error) -> String {
    let mut parts = vec![e.to_string()];
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ").to_ascii_lowercase()
}

fn is_tls_error(chain: &str) -> bool {
    ["certificate", "tls", "handshake", "ssl"]
        .iter()
        .any(|needle| chain.contains(needle))
}

fn connect_error_code(chain: &str) -> ProbeErrorCode {
    if chain.contains("refused") {
        ProbeErrorCode::ConnectionRefused
    } else if chain.contains("reset") {
        ProbeErrorCode::ConnectionReset
    } else if chain.contains("unreachable") {
        ProbeErrorCode::HostUnreachable
    } else {
        ProbeErrorCode::ConnectionRefused
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
