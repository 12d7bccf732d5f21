//! Worker CLI surface and config loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use exit1_domain::config::{Config, ConfigSeverity};

#[derive(Parser)]
#[command(name = "exit1-worker", version, about = "exit1 uptime monitoring worker")]
pub struct Cli {
    /// Region tag this worker serves. Overrides the config file and the
    /// `REGION` environment variable.
    #[arg(long)]
    pub region: Option<String>,

    /// Path to the TOML config file. Missing file = built-in defaults plus
    /// environment overrides.
    #[arg(long, default_value = "exit1.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version and exit.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration and exit non-zero on errors.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

/// Load the config file (when present), then apply environment overrides
/// (`REGION`, `TICK_INTERVAL_MS`, `CONCURRENCY`, `DNS_SERVERS`).
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        Config::default()
    };
    config.apply_env();
    Ok(config)
}

/// Print validation issues; returns false when any error-severity issue
/// exists.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    for issue in &issues {
        eprintln!("{issue}");
    }
    let ok = !issues.iter().any(|i| i.severity == ConfigSeverity::Error);
    if ok {
        eprintln!("config ok");
    }
    ok
}

pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/exit1.toml")).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 60_000);
    }

    #[test]
    fn file_values_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exit1.toml");
        std::fs::write(&path, "[scheduler]\nconcurrency = 16\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.scheduler.concurrency, 16);
    }
}
