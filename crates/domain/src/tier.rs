//! Account tiers — minimum probe interval and per-channel alert budgets.

use serde::{Deserialize, Serialize};

use crate::subscription::ChannelKind;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

/// Alert budget caps for one (tier, channel) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCaps {
    pub hourly_max: u32,
    pub monthly_max: u32,
}

impl Tier {
    /// Minimum allowed probe interval for targets owned by this tier.
    /// Enforced at registration; violations are rejected as config errors.
    pub fn min_interval_seconds(self) -> u32 {
        match self {
            Tier::Free => 60,
            Tier::Pro => 30,
            Tier::Enterprise => 10,
        }
    }

    /// Default alert budget caps per channel. Config may override these
    /// per tier (test knob; production runs on the defaults).
    pub fn budget_caps(self, channel: ChannelKind) -> BudgetCaps {
        match (self, channel) {
            (Tier::Free, ChannelKind::Webhook) => BudgetCaps { hourly_max: 10, monthly_max: 100 },
            (Tier::Free, ChannelKind::Email) => BudgetCaps { hourly_max: 5, monthly_max: 50 },
            (Tier::Free, ChannelKind::Sms) => BudgetCaps { hourly_max: 2, monthly_max: 10 },
            (Tier::Pro, ChannelKind::Webhook) => BudgetCaps { hourly_max: 50, monthly_max: 1_000 },
            (Tier::Pro, ChannelKind::Email) => BudgetCaps { hourly_max: 20, monthly_max: 500 },
            (Tier::Pro, ChannelKind::Sms) => BudgetCaps { hourly_max: 10, monthly_max: 100 },
            (Tier::Enterprise, ChannelKind::Webhook) => {
                BudgetCaps { hourly_max: 200, monthly_max: 10_000 }
            }
            (Tier::Enterprise, ChannelKind::Email) => {
                BudgetCaps { hourly_max: 100, monthly_max: 5_000 }
            }
            (Tier::Enterprise, ChannelKind::Sms) => {
                BudgetCaps { hourly_max: 50, monthly_max: 1_000 }
            }
        }
    }
}
