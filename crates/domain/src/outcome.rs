//! Probe outcome model — the immutable record one probe execution produces.

use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::check::CheckStatus;
use crate::region::Region;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Classified result of a single probe. This is the only error surface the
/// pipeline presents to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Response received, status in the expected set, body assertion held.
    Ok,
    /// Response received, status outside the expected set.
    HttpError,
    /// Expected status but the body substring was not found.
    AssertionFailed,
    /// Redirect observed and the target flags redirects.
    Redirect,
    /// Name resolution failed (not found, or transient retries exhausted).
    DnsFailure,
    /// TCP connect refused, reset, or unreachable.
    ConnectFailure,
    /// Certificate invalid, expired, or hostname mismatch.
    TlsFailure,
    /// Connect or total deadline exceeded.
    Timeout,
    /// Any unclassified I/O failure.
    UnknownError,
}

impl OutcomeKind {
    /// Status the classifier maps this outcome to. `redirect_as_online` is
    /// the check's `treat_redirect_as_online` flag: when unset, a flagged
    /// redirect counts as a degraded response instead of uptime.
    pub fn status(self, redirect_as_online: bool) -> CheckStatus {
        match self {
            OutcomeKind::Ok => CheckStatus::Online,
            OutcomeKind::Redirect if redirect_as_online => CheckStatus::Redirect,
            OutcomeKind::Redirect => CheckStatus::Degraded,
            OutcomeKind::HttpError | OutcomeKind::AssertionFailed => CheckStatus::Degraded,
            OutcomeKind::DnsFailure
            | OutcomeKind::ConnectFailure
            | OutcomeKind::TlsFailure
            | OutcomeKind::Timeout
            | OutcomeKind::UnknownError => CheckStatus::Offline,
        }
    }

    /// Whether this outcome counts against uptime for a check with the
    /// given redirect treatment.
    pub fn is_failure(self, redirect_as_online: bool) -> bool {
        match self {
            OutcomeKind::Ok => false,
            OutcomeKind::Redirect => !redirect_as_online,
            _ => true,
        }
    }

    /// Ordering for daily-rollup "worst outcome" selection. Higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            OutcomeKind::Ok => 0,
            OutcomeKind::Redirect => 1,
            OutcomeKind::AssertionFailed => 2,
            OutcomeKind::HttpError => 3,
            OutcomeKind::UnknownError => 4,
            OutcomeKind::Timeout => 5,
            OutcomeKind::TlsFailure => 6,
            OutcomeKind::ConnectFailure => 7,
            OutcomeKind::DnsFailure => 8,
        }
    }
}

/// Enumerated probe error code carried alongside the human-readable message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorCode {
    NameNotFound,
    TransientDns,
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    HostUnreachable,
    TlsInvalid,
    Protocol,
    PayloadTooLarge,
    Io,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enrichment blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIp {
    pub addr: IpAddr,
    pub family: IpFamily,
}

impl From<IpAddr> for ResolvedIp {
    fn from(addr: IpAddr) -> Self {
        Self { family: IpFamily::of(&addr), addr }
    }
}

/// Geographical context for the probed address. All fields best-effort.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Network ownership context (ASN database).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    /// Reverse-DNS name of the probed address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_dns: Option<String>,
}

/// CDN / edge context derived from response headers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_provider: Option<String>,
    /// Edge PoP code (e.g. `AMS`, `fra56132`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pop: Option<String>,
    /// Provider trace id (e.g. the `cf-ray` value).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Timing breakdown observed by the probe engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Time spent before the request could be sent (includes DNS).
    pub pre_connect_ms: u64,
    /// Send → response headers.
    pub ttfb_ms: u64,
    /// Send → body complete (or cap reached).
    pub total_ms: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Probe outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable record of one probe execution. History is append-only; the id
/// is minted once at probe time so persistence retries and queue replay stay
/// idempotent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub id: String,
    pub check_id: String,
    pub user_id: String,
    pub region: Region,
    pub at: DateTime<Utc>,
    pub kind: OutcomeKind,
    /// Total response time; mirrors `timing.total_ms` for quick reads.
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ProbeErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_ips: Vec<ResolvedIp>,
    /// Family of the address the request actually used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_family: Option<IpFamily>,
    #[serde(default)]
    pub timing: Timing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net: Option<NetInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<EdgeInfo>,
    /// Peer certificate not-after, when the handshake exposed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_expires_at: Option<DateTime<Utc>>,
}

impl ProbeOutcome {
    /// Start a new outcome for a probe that is about to run.
    pub fn begin(check_id: &str, user_id: &str, region: Region, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            check_id: check_id.to_string(),
            user_id: user_id.to_string(),
            region,
            at,
            kind: OutcomeKind::UnknownError,
            response_time_ms: 0,
            status_code: None,
            error_code: None,
            error_message: None,
            resolved_ips: Vec::new(),
            ip_family: None,
            timing: Timing::default(),
            geo: None,
            net: None,
            edge: None,
            tls_cert_expires_at: None,
        }
    }

    /// UTC day partition this outcome belongs to.
    pub fn day(&self) -> NaiveDate {
        self.at.date_naive()
    }

    /// Short user-facing error summary: kind plus optional detail. A
    /// redirect carries no error here; the classifier substitutes its own
    /// message when the check counts redirects as failures.
    pub fn short_error(&self) -> Option<String> {
        let label = match self.kind {
            OutcomeKind::Ok | OutcomeKind::Redirect => return None,
            OutcomeKind::HttpError => "unexpected status",
            OutcomeKind::AssertionFailed => "body assertion failed",
            OutcomeKind::DnsFailure => "dns failure",
            OutcomeKind::ConnectFailure => "connection failed",
            OutcomeKind::TlsFailure => "tls failure",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::UnknownError => "error",
        };
        Some(match (&self.status_code, &self.error_message) {
            (Some(code), _) => format!("{label} ({code})"),
            (None, Some(msg)) => format!("{label}: {msg}"),
            (None, None) => label.to_string(),
        })
    }
}
