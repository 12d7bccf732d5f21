//! Probe engine tests against a minimal local HTTP server.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use exit1_domain::check::{Check, RedirectPolicy};
use exit1_domain::config::{DnsConfig, HttpProbeConfig};
use exit1_domain::outcome::{IpFamily, OutcomeKind, ProbeErrorCode};
use exit1_probe::dns::{DnsError, ResolveBackend, ResolverCache};
use exit1_probe::engine::ProbeEngine;
use exit1_probe::Prober;

/// The engine under test only probes IP-literal URLs, which short-circuit
/// before the backend; resolving through it would be a test bug.
struct UnreachableBackend;

#[async_trait]
impl ResolveBackend for UnreachableBackend {
    async fn lookup(
        &self,
        host: &str,
        _family: IpFamily,
        _rotation: usize,
    ) -> Result<Vec<IpAddr>, DnsError> {
        panic!("unexpected upstream lookup for {host}");
    }
}

fn engine(config: HttpProbeConfig) -> ProbeEngine {
    let dns = Arc::new(ResolverCache::new(
        DnsConfig::default(),
        Arc::new(UnreachableBackend),
    ));
    ProbeEngine::new(config, dns).expect("engine builds")
}

/// Serve one connection with a canned HTTP/1.1 response, then close.
async fn serve_once(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    format!("http://{addr}/health")
}

fn check_for(url: &str) -> Check {
    Check::new("u1", "local", url, 60)
}

#[tokio::test]
async fn ok_response_classifies_online() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\ncontent-length: 12\r\ncontent-type: text/plain\r\n\r\nall systems!",
    )
    .await;
    let report = engine(HttpProbeConfig::default())
        .probe(&check_for(&url), Utc::now())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::Ok);
    assert_eq!(report.outcome.status_code, Some(200));
    assert_eq!(report.outcome.ip_family, Some(IpFamily::V4));
    assert_eq!(report.outcome.resolved_ips.len(), 1);
    assert!(report
        .headers
        .iter()
        .any(|(n, v)| n == "content-type" && v == "text/plain"));
    assert!(report.outcome.response_time_ms < 5_000);
}

#[tokio::test]
async fn server_error_classifies_http_error() {
    let url = serve_once("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n").await;
    let report = engine(HttpProbeConfig::default())
        .probe(&check_for(&url), Utc::now())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::HttpError);
    assert_eq!(report.outcome.status_code, Some(503));
    assert_eq!(
        report.outcome.error_message.as_deref(),
        Some("unexpected status 503")
    );
}

#[tokio::test]
async fn body_assertion_failure() {
    let url =
        serve_once("HTTP/1.1 200 OK\r\ncontent-length: 8\r\n\r\ndegraded").await;
    let mut check = check_for(&url);
    check.assert_body_contains = Some("healthy".into());
    let report = engine(HttpProbeConfig::default()).probe(&check, Utc::now()).await;

    assert_eq!(report.outcome.kind, OutcomeKind::AssertionFailed);
}

#[tokio::test]
async fn flagged_redirect_classifies_redirect() {
    let url = serve_once(
        "HTTP/1.1 301 Moved Permanently\r\nlocation: https://elsewhere.example/\r\ncontent-length: 0\r\n\r\n",
    )
    .await;
    let mut check = check_for(&url);
    check.redirect_policy = RedirectPolicy::Flag;
    let report = engine(HttpProbeConfig::default()).probe(&check, Utc::now()).await;

    assert_eq!(report.outcome.kind, OutcomeKind::Redirect);
    assert_eq!(report.outcome.status_code, Some(301));
}

#[tokio::test]
async fn followed_redirect_classifies_by_final_status() {
    // Target answers 200; a front server answers 301 pointing at it. With
    // the follow policy the ultimate 200 wins even when only {200..299}
    // is expected.
    let target_url = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok").await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let location = target_url.clone();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 301 Moved Permanently\r\nlocation: {location}\r\ncontent-length: 0\r\n\r\n"
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    let url = format!("http://{addr}/old");
    let report = engine(HttpProbeConfig::default())
        .probe(&check_for(&url), Utc::now())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::Ok);
    assert_eq!(report.outcome.status_code, Some(200));
}

#[tokio::test]
async fn connection_refused_classifies_connect_failure() {
    // Bind then drop immediately so the port is closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/");
    let report = engine(HttpProbeConfig::default())
        .probe(&check_for(&url), Utc::now())
        .await;

    assert_eq!(report.outcome.kind, OutcomeKind::ConnectFailure);
    assert_eq!(
        report.outcome.error_code,
        Some(ProbeErrorCode::ConnectionRefused)
    );
}

#[tokio::test]
async fn stalled_server_classifies_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and hold the connection open without responding.
        if let Ok((stream, _)) = listener.accept().await {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            drop(stream);
        }
    });

    let config = HttpProbeConfig {
        total_timeout_ms: 300,
        connect_timeout_ms: 300,
        ..HttpProbeConfig::default()
    };
    let url = format!("http://{addr}/");
    let report = engine(config).probe(&check_for(&url), Utc::now()).await;

    assert_eq!(report.outcome.kind, OutcomeKind::Timeout);
    assert_eq!(report.outcome.error_code, Some(ProbeErrorCode::Timeout));
}

#[tokio::test]
async fn oversized_body_is_capped_not_failed() {
    // 64 KB cap; serve ~200 KB. The probe still classifies from the status
    // and the captured prefix.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let body = "x".repeat(200 * 1024);
            let head = format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n", body.len());
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(body.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    let url = format!("http://{addr}/");
    let report = engine(HttpProbeConfig::default())
        .probe(&check_for(&url), Utc::now())
        .await;
    assert_eq!(report.outcome.kind, OutcomeKind::Ok);
}

#[tokio::test]
async fn probe_records_timing_phases() {
    let url = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok").await;
    let report = engine(HttpProbeConfig::default())
        .probe(&check_for(&url), Utc::now())
        .await;

    let timing = report.outcome.timing;
    assert!(timing.total_ms >= timing.ttfb_ms);
    assert_eq!(report.outcome.response_time_ms, timing.total_ms);
}
