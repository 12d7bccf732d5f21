use exit1_domain::config::{Config, ConfigSeverity};

#[test]
fn defaults_match_fleet_constants() {
    let config = Config::default();
    assert_eq!(config.scheduler.tick_interval_ms, 60_000);
    assert_eq!(config.scheduler.concurrency, 128);
    assert_eq!(config.scheduler.jitter_pct, 10);
    assert_eq!(config.scheduler.lock_lease_ms, 300_000);
    assert_eq!(config.probe.connect_timeout_ms, 10_000);
    assert_eq!(config.probe.total_timeout_ms, 30_000);
    assert_eq!(config.probe.max_redirects, 5);
    assert_eq!(config.probe.max_response_bytes, 64 * 1024);
    assert_eq!(config.probe.user_agent, "Exit1-Monitor/1.0");
    assert_eq!(config.alerts.webhook_retry_backoff_ms, vec![500, 2_000, 8_000]);
    assert_eq!(config.alerts.dedupe_window_ms, 60_000);
    assert_eq!(config.aggregator.lookback_days, 2);
}

#[test]
fn default_dns_upstreams_rotate_providers() {
    let config = Config::default();
    assert_eq!(
        config.dns.upstream_servers,
        vec!["1.1.1.1", "8.8.8.8", "1.0.0.1", "8.8.4.4", "9.9.9.9"]
    );
    assert_eq!(config.dns.positive_ttl_ms, 120_000);
    assert_eq!(config.dns.negative_ttl_permanent_ms, 30_000);
    assert_eq!(config.dns.negative_ttl_transient_ms, 5_000);
    assert_eq!(config.dns.retry_backoff_ms, vec![200, 400, 800]);
}

#[test]
fn defaults_pass_validation() {
    let issues = Config::default().validate();
    assert!(
        !issues.iter().any(|i| i.severity == ConfigSeverity::Error),
        "unexpected errors: {issues:?}"
    );
}

#[test]
fn explicit_overrides_parse() {
    let toml_str = r#"
[worker]
region = "eu"

[scheduler]
tick_interval_ms = 30000
concurrency = 64

[dns]
upstream_servers = ["9.9.9.9"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.worker.region.as_str(), "eu");
    assert_eq!(config.scheduler.tick_interval_ms, 30_000);
    assert_eq!(config.scheduler.concurrency, 64);
    assert_eq!(config.dns.upstream_servers, vec!["9.9.9.9"]);
    // Untouched sections keep their defaults.
    assert_eq!(config.probe.total_timeout_ms, 30_000);
}

#[test]
fn bad_upstream_and_zero_tick_are_errors() {
    let mut config = Config::default();
    config.dns.upstream_servers = vec!["not-an-ip".into()];
    config.scheduler.tick_interval_ms = 0;
    let issues = config.validate();
    assert!(issues.iter().any(|i| i.field == "dns.upstream_servers"));
    assert!(issues.iter().any(|i| i.field == "scheduler.tick_interval_ms"));
}

#[test]
fn total_timeout_must_cover_connect() {
    let mut config = Config::default();
    config.probe.total_timeout_ms = 5_000; // below connect_timeout_ms
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "probe.total_timeout_ms" && i.severity == ConfigSeverity::Error));
}
