//! Target metadata enricher — GeoIP, ASN, CDN/edge detection, reverse DNS.
//!
//! Strictly best-effort: every failure is swallowed and logged at warn, the
//! probe outcome is recorded either way.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use maxminddb::geoip2;

use exit1_domain::config::GeoIpConfig;
use exit1_domain::outcome::{EdgeInfo, GeoInfo, NetInfo};

use crate::dns::ResolverCache;
use crate::ProbeReport;

pub struct Enricher {
    city: Option<maxminddb::Reader<Vec<u8>>>,
    asn: Option<maxminddb::Reader<Vec<u8>>>,
    dns: Arc<ResolverCache>,
    reverse_dns: bool,
}

impl Enricher {
    /// Load the configured databases. A missing or unreadable database
    /// disables that lookup with a warning; it never fails worker startup.
    pub fn new(config: &GeoIpConfig, dns: Arc<ResolverCache>) -> Self {
        Self {
            city: config.city_db_path.as_deref().and_then(open_db),
            asn: config.asn_db_path.as_deref().and_then(open_db),
            dns,
            reverse_dns: config.reverse_dns,
        }
    }

    /// Attach geo / network / edge context to the report. Missing data is
    /// omitted, never an error.
    pub async fn enrich(&self, report: &mut ProbeReport) {
        if let Some(edge) = detect_edge(&report.headers) {
            report.outcome.edge = Some(edge);
        }

        let Some(ip) = primary_ip(report) else {
            return;
        };

        if let Some(reader) = &self.city {
            match reader.lookup::<geoip2::City>(ip) {
                Ok(city) => report.outcome.geo = Some(geo_from_city(&city)),
                Err(e) => tracing::warn!(%ip, error = %e, "geoip city lookup failed"),
            }
        }

        let mut net = NetInfo::default();
        if let Some(reader) = &self.asn {
            match reader.lookup::<geoip2::Asn>(ip) {
                Ok(asn) => {
                    net.asn = asn.autonomous_system_number;
                    net.organization = asn
                        .autonomous_system_organization
                        .map(|s| s.to_string());
                    net.isp = net.organization.clone();
                }
                Err(e) => tracing::warn!(%ip, error = %e, "geoip asn lookup failed"),
            }
        }
        if self.reverse_dns {
            net.reverse_dns = self.dns.reverse(ip).await;
        }
        if net != NetInfo::default() {
            report.outcome.net = Some(net);
        }
    }
}

fn open_db(path: &Path) -> Option<maxminddb::Reader<Vec<u8>>> {
    match maxminddb::Reader::open_readfile(path) {
        Ok(reader) => Some(reader),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "geoip database unavailable");
            None
        }
    }
}

/// The address the request used: first of the chosen family, else first.
fn primary_ip(report: &ProbeReport) -> Option<IpAddr> {
    let outcome = &report.outcome;
    match outcome.ip_family {
        Some(family) => outcome
            .resolved_ips
            .iter()
            .find(|a| a.family == family)
            .map(|a| a.addr),
        None => outcome.resolved_ips.first().map(|a| a.addr),
    }
}

fn geo_from_city(city: &geoip2::City) -> GeoInfo {
    GeoInfo {
        country: city
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(|s| s.to_string()),
        region: city
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|s| s.iso_code)
            .map(|s| s.to_string()),
        city: city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string()),
        latitude: city.location.as_ref().and_then(|l| l.latitude),
        longitude: city.location.as_ref().and_then(|l| l.longitude),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CDN / edge detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Header ruleset, first match wins. Header names are matched lowercase.
pub fn detect_edge(headers: &[(String, String)]) -> Option<EdgeInfo> {
    let get = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    // Cloudflare: cf-ray = "<trace>-<POP>".
    if let Some(ray) = get("cf-ray") {
        return Some(EdgeInfo {
            cdn_provider: Some("cloudflare".into()),
            pop: ray.rsplit_once('-').map(|(_, pop)| pop.to_string()),
            trace_id: Some(ray.to_string()),
        });
    }
    // CloudFront: dedicated PoP and request-id headers.
    if let Some(pop) = get("x-amz-cf-pop") {
        return Some(EdgeInfo {
            cdn_provider: Some("cloudfront".into()),
            pop: Some(pop.to_string()),
            trace_id: get("x-amz-cf-id").map(|s| s.to_string()),
        });
    }
    // Fastly: x-served-by = "cache-<pop-instance>" (last hop wins).
    if let Some(served_by) = get("x-served-by") {
        let last = served_by.rsplit(',').next().unwrap_or(served_by).trim();
        return Some(EdgeInfo {
            cdn_provider: Some("fastly".into()),
            pop: last.rsplit('-').next().map(|s| s.to_string()),
            trace_id: get("x-timer").map(|s| s.to_string()),
        });
    }
    // Vercel: x-vercel-id = "<pop>::<id>".
    if let Some(id) = get("x-vercel-id") {
        return Some(EdgeInfo {
            cdn_provider: Some("vercel".into()),
            pop: id.split("::").next().map(|s| s.to_string()),
            trace_id: Some(id.to_string()),
        });
    }
    // Bunny: pull-zone header plus a request id.
    if get("cdn-pullzone").is_some() {
        return Some(EdgeInfo {
            cdn_provider: Some("bunny".into()),
            pop: get("cdn-edgestorageid").map(|s| s.to_string()),
            trace_id: get("cdn-requestid").map(|s| s.to_string()),
        });
    }
    // Akamai (when debug pragmas are on).
    if get("x-akamai-request-id").is_some() || get("x-akamai-transformed").is_some() {
        return Some(EdgeInfo {
            cdn_provider: Some("akamai".into()),
            pop: None,
            trace_id: get("x-akamai-request-id").map(|s| s.to_string()),
        });
    }
    // Fall back on the server banner for a provider tag only.
    if let Some(server) = get("server") {
        let server = server.to_ascii_lowercase();
        let provider = if server.contains("cloudflare") {
            Some("cloudflare")
        } else if server.contains("cloudfront") {
            Some("cloudfront")
        } else if server == "gws" || server.contains("gfe") {
            Some("google")
        } else {
            None
        };
        if let Some(p) = provider {
            return Some(EdgeInfo {
                cdn_provider: Some(p.into()),
                pop: None,
                trace_id: None,
            });
        }
    }
    None
}
