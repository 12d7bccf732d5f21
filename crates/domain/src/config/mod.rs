mod aggregator;
mod alerts;
mod dns;
mod geoip;
mod http_probe;
mod scheduler;
mod server;
mod worker;

pub use aggregator::*;
pub use alerts::*;
pub use dns::*;
pub use geoip::*;
pub use http_probe::*;
pub use scheduler::*;
pub use server::*;
pub use worker::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub probe: HttpProbeConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub geoip: GeoIpConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

fn warn(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Warning,
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.worker.region.as_str().is_empty() {
            errors.push(err("worker.region", "region must not be empty"));
        }
        if !self
            .worker
            .allowed_regions
            .iter()
            .any(|r| r == self.worker.region.as_str())
        {
            errors.push(err(
                "worker.region",
                format!(
                    "region '{}' is not in worker.allowed_regions",
                    self.worker.region
                ),
            ));
        }

        if self.scheduler.tick_interval_ms == 0 {
            errors.push(err("scheduler.tick_interval_ms", "must be greater than 0"));
        }
        if self.scheduler.concurrency == 0 {
            errors.push(err("scheduler.concurrency", "must be greater than 0"));
        }
        if self.scheduler.lock_lease_ms < self.scheduler.tick_interval_ms {
            errors.push(warn(
                "scheduler.lock_lease_ms",
                "lease shorter than the tick interval defeats the lock",
            ));
        }
        if self.scheduler.jitter_pct > 50 {
            errors.push(err("scheduler.jitter_pct", "jitter above 50% is nonsense"));
        }

        if self.dns.upstream_servers.is_empty() {
            errors.push(err("dns.upstream_servers", "at least one upstream required"));
        }
        for s in &self.dns.upstream_servers {
            if s.parse::<std::net::IpAddr>().is_err() {
                errors.push(err(
                    "dns.upstream_servers",
                    format!("'{s}' is not an IP address"),
                ));
            }
        }
        if self.dns.retry_backoff_ms.len() < self.dns.max_retries as usize {
            errors.push(warn(
                "dns.retry_backoff_ms",
                "fewer backoff steps than max_retries; the last step repeats",
            ));
        }

        if self.probe.total_timeout_ms < self.probe.connect_timeout_ms {
            errors.push(err(
                "probe.total_timeout_ms",
                "total timeout must cover the connect timeout",
            ));
        }
        if self.probe.max_response_bytes == 0 {
            errors.push(err("probe.max_response_bytes", "must be greater than 0"));
        }

        if self.alerts.webhook_timeout_ms == 0 {
            errors.push(err("alerts.webhook_timeout_ms", "must be greater than 0"));
        }

        if self.server.port == 0 {
            errors.push(err("server.port", "port must be greater than 0"));
        }

        errors
    }

    /// Apply the environment overrides enumerated for the worker fleet:
    /// `REGION`, `TICK_INTERVAL_MS`, `CONCURRENCY`, `DNS_SERVERS`.
    pub fn apply_env(&mut self) {
        if let Ok(region) = std::env::var("REGION") {
            if let Ok(tag) = crate::region::Region::parse(&region) {
                self.worker.region = tag;
            }
        }
        if let Some(ms) = env_parse::<u64>("TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms = ms;
        }
        if let Some(n) = env_parse::<usize>("CONCURRENCY") {
            self.scheduler.concurrency = n;
        }
        if let Ok(servers) = std::env::var("DNS_SERVERS") {
            let parsed: Vec<String> = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.dns.upstream_servers = parsed;
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
