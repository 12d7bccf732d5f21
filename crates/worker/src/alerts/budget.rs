//! Alert budget enforcement — rolling-hour and calendar-month counters per
//! (user, channel), capped by tier.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use exit1_domain::config::AlertsConfig;
use exit1_domain::subscription::ChannelKind;
use exit1_domain::tier::Tier;
use exit1_store::{BudgetKey, BudgetStore, BudgetWindow, StoreResult};

pub const HOUR_WINDOW_MS: i64 = 3_600_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetDecision {
    Allowed,
    Suppressed {
        window: BudgetWindow,
        count: u32,
        max: u32,
    },
}

/// Window starts are part of the counter key, so caps take effect on the
/// next window after a tier change.
pub fn hour_window_start(now: DateTime<Utc>) -> i64 {
    let ms = now.timestamp_millis();
    ms - ms.rem_euclid(HOUR_WINDOW_MS)
}

pub fn month_window_start(now: DateTime<Utc>) -> i64 {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .map(|d| d.timestamp_millis())
        .unwrap_or_else(|| hour_window_start(now))
}

pub struct BudgetGate {
    store: Arc<dyn BudgetStore>,
    config: AlertsConfig,
}

impl BudgetGate {
    pub fn new(store: Arc<dyn BudgetStore>, config: AlertsConfig) -> Self {
        Self { store, config }
    }

    /// Consume one send from both windows. The increment is atomic with the
    /// send decision: over-budget increments are compensated immediately.
    pub async fn try_consume(
        &self,
        user_id: &str,
        tier: Tier,
        channel: ChannelKind,
        now: DateTime<Utc>,
    ) -> StoreResult<BudgetDecision> {
        let caps = self.config.budget_caps(tier, channel);

        let hour_key = BudgetKey {
            user_id: user_id.to_string(),
            channel,
            window: BudgetWindow::Hour,
            window_start_ms: hour_window_start(now),
        };
        let hourly = self.store.increment(&hour_key).await?;
        if hourly > caps.hourly_max {
            self.store.decrement(&hour_key).await?;
            return Ok(BudgetDecision::Suppressed {
                window: BudgetWindow::Hour,
                count: hourly,
                max: caps.hourly_max,
            });
        }

        let month_key = BudgetKey {
            user_id: user_id.to_string(),
            channel,
            window: BudgetWindow::Month,
            window_start_ms: month_window_start(now),
        };
        let monthly = self.store.increment(&month_key).await?;
        if monthly > caps.monthly_max {
            self.store.decrement(&month_key).await?;
            self.store.decrement(&hour_key).await?;
            return Ok(BudgetDecision::Suppressed {
                window: BudgetWindow::Month,
                count: monthly,
                max: caps.monthly_max,
            });
        }

        Ok(BudgetDecision::Allowed)
    }

    /// Current usage, for the budget-read endpoint.
    pub async fn usage(
        &self,
        user_id: &str,
        tier: Tier,
        channel: ChannelKind,
        now: DateTime<Utc>,
    ) -> StoreResult<BudgetUsage> {
        let caps = self.config.budget_caps(tier, channel);
        let hour_start = hour_window_start(now);
        let month_start = month_window_start(now);
        let hourly = self
            .store
            .get_count(&BudgetKey {
                user_id: user_id.to_string(),
                channel,
                window: BudgetWindow::Hour,
                window_start_ms: hour_start,
            })
            .await?;
        let monthly = self
            .store
            .get_count(&BudgetKey {
                user_id: user_id.to_string(),
                channel,
                window: BudgetWindow::Month,
                window_start_ms: month_start,
            })
            .await?;
        Ok(BudgetUsage {
            hourly_count: hourly,
            hourly_max: caps.hourly_max,
            hourly_window_start_ms: hour_start,
            monthly_count: monthly,
            monthly_max: caps.monthly_max,
            monthly_window_start_ms: month_start,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BudgetUsage {
    pub hourly_count: u32,
    pub hourly_max: u32,
    pub hourly_window_start_ms: i64,
    pub monthly_count: u32,
    pub monthly_max: u32,
    pub monthly_window_start_ms: i64,
}
