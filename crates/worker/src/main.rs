use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use exit1_domain::config::{Config, ConfigSeverity};
use exit1_domain::region::Region;
use exit1_probe::dns::ResolverCache;
use exit1_probe::engine::ProbeEngine;
use exit1_probe::enrich::Enricher;
use exit1_store::memory::MemoryStore;
use exit1_store::queue::DurableQueue;

use exit1_worker::alerts::Dispatcher;
use exit1_worker::cli::{Cli, Command, ConfigCommand};
use exit1_worker::metrics::Metrics;
use exit1_worker::sink::ResultSink;
use exit1_worker::state::AppState;
use exit1_worker::{aggregator, api, scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to running the worker when no subcommand is given.
        None => {
            init_tracing();
            let mut config = exit1_worker::cli::load_config(&cli.config)?;
            if let Some(region) = &cli.region {
                config.worker.region = Region::parse(region)?;
            }
            run_worker(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = exit1_worker::cli::load_config(&cli.config)?;
            if !exit1_worker::cli::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = exit1_worker::cli::load_config(&cli.config)?;
            exit1_worker::cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("exit1-worker {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,exit1_worker=debug")),
        )
        .json()
        .init();
}

/// Start the worker with the given configuration.
async fn run_worker(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(region = %config.worker.region, "exit1 worker starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Stores ───────────────────────────────────────────────────────
    // The in-memory reference store backs every repository trait here; a
    // managed document-store deployment swaps these Arcs at this seam.
    let store = Arc::new(MemoryStore::new());
    tracing::info!("stores ready");

    // ── DNS resolver cache ───────────────────────────────────────────
    let dns = Arc::new(
        ResolverCache::from_config(config.dns.clone())
            .map_err(|e| anyhow::anyhow!("dns resolver init: {e}"))?,
    );
    let _eviction = Arc::clone(&dns).spawn_eviction();
    tracing::info!(
        upstreams = config.dns.upstream_servers.len(),
        "dns resolver cache ready"
    );

    // ── Probe engine + enricher ──────────────────────────────────────
    let prober = Arc::new(
        ProbeEngine::new(config.probe.clone(), Arc::clone(&dns))
            .context("building probe engine")?,
    );
    let enricher = Arc::new(Enricher::new(&config.geoip, Arc::clone(&dns)));
    tracing::info!(user_agent = %config.probe.user_agent, "probe engine ready");

    // ── Result sink ──────────────────────────────────────────────────
    let metrics = Arc::new(Metrics::default());
    let queue = Arc::new(DurableQueue::new(&config.worker.state_path));
    let sink = Arc::new(ResultSink::new(
        store.clone(),
        store.clone(),
        store.clone(),
        queue,
        metrics.clone(),
    ));
    tracing::info!(state_path = %config.worker.state_path.display(), "result sink ready");

    // ── Alert dispatcher ─────────────────────────────────────────────
    let dispatcher = Arc::new(
        Dispatcher::new(
            store.clone(),
            store.clone(),
            config.alerts.clone(),
            metrics.clone(),
        )
        .map_err(|e| anyhow::anyhow!("dispatcher init: {e}"))?,
    );
    tracing::info!("alert dispatcher ready");

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var = %env_var, "API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!(
                    env_var = %env_var,
                    "API bearer-token auth DISABLED — set {env_var} to enable"
                );
                None
            }
        }
    };

    // ── App state ────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let worker_id = format!(
        "{}-{}",
        config.worker.region,
        uuid::Uuid::new_v4().simple()
    );
    let state = AppState {
        config: config.clone(),
        worker_id: worker_id.clone(),
        shutdown: shutdown.clone(),
        checks: store.clone(),
        outcomes: store.clone(),
        rollups: store.clone(),
        subscriptions: store.clone(),
        budgets: store.clone(),
        locks: store.clone(),
        dns,
        prober,
        enricher,
        sink,
        dispatcher,
        metrics,
        api_token_hash,
    };
    tracing::info!(worker_id = %worker_id, "worker state ready");

    // ── Scheduler + aggregator loops ─────────────────────────────────
    let scheduler_handle = tokio::spawn(scheduler::run(state.clone()));
    let aggregator_handle = tokio::spawn(aggregator::run(state.clone()));

    // ── API server ───────────────────────────────────────────────────
    let app = build_api(&config, state.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "API listening");
    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await
        {
            tracing::error!(error = %e, "api server error");
        }
    });

    // ── Run until SIGTERM / SIGINT ───────────────────────────────────
    wait_for_shutdown().await;
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();

    let _ = scheduler_handle.await;
    let _ = aggregator_handle.await;
    let _ = api_handle.await;
    tracing::info!("exit1 worker stopped cleanly");
    Ok(())
}

fn build_api(config: &Config, state: AppState) -> axum::Router {
    let mut router = api::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ));

    // Per-IP rate limit (token bucket via governor), when configured.
    if let Some(rl) = &config.server.rate_limit {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");
        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );
        router = router.layer(GovernorLayer {
            config: Arc::new(gov_config),
        });
    }
    router
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
