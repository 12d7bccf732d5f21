use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::subscription::ChannelKind;
use crate::tier::{BudgetCaps, Tier};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Alert dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Total timeout per webhook delivery attempt.
    #[serde(default = "d_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
    /// Webhook retry attempts on connect failure / 5xx / 408 / 429.
    #[serde(default = "d_webhook_max_retries")]
    pub webhook_max_retries: u32,
    /// Backoff before retry attempt N (the last step repeats if exceeded).
    #[serde(default = "d_webhook_retry_backoff_ms")]
    pub webhook_retry_backoff_ms: Vec<u64>,
    /// Identical (check, event, status) tuples within this window collapse
    /// to one dispatch per channel.
    #[serde(default = "d_dedupe_window_ms")]
    pub dedupe_window_ms: u64,
    /// Per-tier budget cap overrides (test knob; production uses the tier
    /// defaults).
    #[serde(default)]
    pub budget_overrides: HashMap<Tier, HashMap<ChannelKind, BudgetCaps>>,
    #[serde(default)]
    pub email: EmailProviderConfig,
    #[serde(default)]
    pub sms: SmsProviderConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_ms: d_webhook_timeout_ms(),
            webhook_max_retries: d_webhook_max_retries(),
            webhook_retry_backoff_ms: d_webhook_retry_backoff_ms(),
            dedupe_window_ms: d_dedupe_window_ms(),
            budget_overrides: HashMap::new(),
            email: EmailProviderConfig::default(),
            sms: SmsProviderConfig::default(),
        }
    }
}

impl AlertsConfig {
    /// Budget caps for a (tier, channel), honoring config overrides.
    pub fn budget_caps(&self, tier: Tier, channel: ChannelKind) -> BudgetCaps {
        self.budget_overrides
            .get(&tier)
            .and_then(|per_channel| per_channel.get(&channel))
            .copied()
            .unwrap_or_else(|| tier.budget_caps(channel))
    }
}

/// Opaque email provider: JSON POST with a bearer key from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailProviderConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "d_email_from")]
    pub from: String,
    #[serde(default = "d_email_key_env")]
    pub api_key_env: String,
}

impl Default for EmailProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            from: d_email_from(),
            api_key_env: d_email_key_env(),
        }
    }
}

/// Opaque SMS provider: JSON POST with a bearer key from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsProviderConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "d_sms_key_env")]
    pub api_key_env: String,
}

impl Default for SmsProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: d_sms_key_env(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_webhook_timeout_ms() -> u64 {
    10_000
}
fn d_webhook_max_retries() -> u32 {
    3
}
fn d_webhook_retry_backoff_ms() -> Vec<u64> {
    vec![500, 2_000, 8_000]
}
fn d_dedupe_window_ms() -> u64 {
    60_000
}
fn d_email_from() -> String {
    "alerts@exit1.dev".into()
}
fn d_email_key_env() -> String {
    "EMAIL_PROVIDER_KEY".into()
}
fn d_sms_key_env() -> String {
    "SMS_PROVIDER_KEY".into()
}
