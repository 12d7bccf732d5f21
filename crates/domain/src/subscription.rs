//! Alert subscriptions — per-user channel recipients, enabled event sets,
//! and per-check overrides.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Webhook,
    Email,
    Sms,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] =
        [ChannelKind::Webhook, ChannelKind::Email, ChannelKind::Sms];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Webhook => "webhook",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }
}

fn d_min_consecutive() -> u32 {
    1
}

fn default_events() -> HashSet<EventKind> {
    HashSet::from([EventKind::WentOffline, EventKind::CameOnline])
}

/// Per-check override of the base subscription. `None` fields fall through
/// to the base values.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub events: Option<HashSet<EventKind>>,
}

/// A user's alert subscription across all channels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertSubscription {
    pub user_id: String,

    // ── Recipients (a channel is active when its recipient is set) ────
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Secret for the `X-Signature` HMAC on webhook deliveries.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Extra headers attached to webhook deliveries.
    #[serde(default)]
    pub webhook_headers: HashMap<String, String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,

    // ── Event selection ───────────────────────────────────────────────
    /// Enabled event kinds (subset of went_offline / came_online /
    /// error_observed). `auto_disabled` is terminal and bypasses this set.
    #[serde(default = "default_events")]
    pub events: HashSet<EventKind>,
    /// Minimum consecutive failures before failure events fire.
    #[serde(default = "d_min_consecutive")]
    pub min_consecutive_events: u32,
    /// Per-check overrides, keyed by check id.
    #[serde(default)]
    pub overrides: HashMap<String, CheckOverride>,
}

impl AlertSubscription {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            webhook_url: None,
            webhook_secret: None,
            webhook_headers: HashMap::new(),
            email: None,
            phone: None,
            events: default_events(),
            min_consecutive_events: d_min_consecutive(),
            overrides: HashMap::new(),
        }
    }

    /// Recipient for a channel, when configured.
    pub fn recipient(&self, channel: ChannelKind) -> Option<&str> {
        match channel {
            ChannelKind::Webhook => self.webhook_url.as_deref(),
            ChannelKind::Email => self.email.as_deref(),
            ChannelKind::Sms => self.phone.as_deref(),
        }
    }

    /// Whether `kind` should fire for `check_id`, after resolving the
    /// per-check override against the base subscription.
    pub fn wants(&self, check_id: &str, kind: EventKind) -> bool {
        if kind == EventKind::AutoDisabled {
            // Terminal event, always delivered to subscribed channels.
            return true;
        }
        if let Some(ovr) = self.overrides.get(check_id) {
            if ovr.enabled == Some(false) {
                return false;
            }
            if let Some(events) = &ovr.events {
                return events.contains(&kind);
            }
        }
        self.events.contains(&kind)
    }
}
