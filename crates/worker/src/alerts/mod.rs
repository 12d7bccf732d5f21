//! Alert dispatcher — delivers transition events to subscribed channels
//! under budget constraints, with dedupe and per-(check, channel) ordering.

pub mod budget;
pub mod email;
pub mod sms;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use exit1_domain::check::Check;
use exit1_domain::config::AlertsConfig;
use exit1_domain::event::{EventKind, TransitionEvent};
use exit1_domain::subscription::{AlertSubscription, ChannelKind};
use exit1_store::{BudgetStore, SubscriptionStore};

use crate::metrics::Metrics;
use budget::{BudgetDecision, BudgetGate};
use email::EmailChannel;
use sms::SmsChannel;
use webhook::WebhookChannel;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    Budget,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Delivered,
    Suppressed { reason: SuppressReason },
    Failed { error: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Dispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    budget: BudgetGate,
    webhook: WebhookChannel,
    email: EmailChannel,
    sms: SmsChannel,
    config: AlertsConfig,
    /// Dedupe window: dedupe key → last dispatch time.
    recent: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Per-(check, channel) ordering locks: a slower delivery must not be
    /// overtaken by a later event on the same channel.
    order_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        budgets: Arc<dyn BudgetStore>,
        config: AlertsConfig,
        metrics: Arc<Metrics>,
    ) -> exit1_domain::Result<Self> {
        Ok(Self {
            subscriptions,
            budget: BudgetGate::new(budgets, config.clone()),
            webhook: WebhookChannel::new(config.clone())?,
            email: EmailChannel::new(config.email.clone())?,
            sms: SmsChannel::new(config.sms.clone())?,
            config,
            recent: Mutex::new(HashMap::new()),
            order_locks: Mutex::new(HashMap::new()),
            metrics,
        })
    }

    pub fn budget_gate(&self) -> &BudgetGate {
        &self.budget
    }

    /// Deliver one transition event across the user's configured channels.
    /// Never propagates errors to the scheduler.
    pub async fn dispatch_event(
        &self,
        check: &Check,
        event: &TransitionEvent,
        now: DateTime<Utc>,
    ) -> Vec<(ChannelKind, DispatchResult)> {
        let sub = match self.subscriptions.get_subscription(&event.user_id).await {
            Ok(Some(sub)) => sub,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(user_id = %event.user_id, error = %e, "subscription lookup failed");
                return Vec::new();
            }
        };

        if !Self::eligible(&sub, check, event) {
            return Vec::new();
        }

        let mut results = Vec::new();
        let duplicate = self.mark_dispatched(event, now);
        for channel in ChannelKind::ALL {
            let Some(recipient) = sub.recipient(channel) else {
                continue;
            };
            if duplicate {
                results.push((
                    channel,
                    DispatchResult::Suppressed { reason: SuppressReason::Duplicate },
                ));
                continue;
            }
            let result = self
                .dispatch_channel(&sub, check, event, channel, recipient, now)
                .await;
            match &result {
                DispatchResult::Delivered => Metrics::incr(&self.metrics.alerts_delivered),
                DispatchResult::Suppressed { .. } => {
                    Metrics::incr(&self.metrics.alerts_suppressed)
                }
                DispatchResult::Failed { error } => {
                    Metrics::incr(&self.metrics.alerts_failed);
                    tracing::warn!(
                        check_id = %check.id,
                        channel = channel.as_str(),
                        error,
                        "alert delivery failed"
                    );
                }
            }
            results.push((channel, result));
        }
        results
    }

    /// Drop dedupe entries older than the window. Called by the aggregator.
    pub fn prune(&self, now: DateTime<Utc>) {
        let window = Duration::milliseconds(self.config.dedupe_window_ms as i64);
        self.recent.lock().retain(|_, at| now - *at < window);
        self.order_locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    // ── Private ──────────────────────────────────────────────────────

    /// Alert eligibility: event enabled for this check, failure threshold
    /// met, and the check not disabled (auto-disable is terminal and still
    /// emitted).
    fn eligible(sub: &AlertSubscription, check: &Check, event: &TransitionEvent) -> bool {
        if check.disabled && event.kind != EventKind::AutoDisabled {
            return false;
        }
        if !sub.wants(&event.check_id, event.kind) {
            return false;
        }
        if event.kind != EventKind::AutoDisabled
            && event.failures_at_emit < sub.min_consecutive_events
        {
            return false;
        }
        true
    }

    /// Record the dispatch; returns true when an identical (check, kind,
    /// status) tuple was already dispatched inside the dedupe window.
    fn mark_dispatched(&self, event: &TransitionEvent, now: DateTime<Utc>) -> bool {
        let window = Duration::milliseconds(self.config.dedupe_window_ms as i64);
        let key = event.dedupe_key();
        let mut recent = self.recent.lock();
        if let Some(last) = recent.get(&key) {
            if now - *last < window {
                return true;
            }
        }
        recent.insert(key, now);
        false
    }

    fn order_lock(&self, check_id: &str, channel: ChannelKind) -> Arc<tokio::sync::Mutex<()>> {
        let key = format!("{check_id}:{}", channel.as_str());
        self.order_locks
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn dispatch_channel(
        &self,
        sub: &AlertSubscription,
        check: &Check,
        event: &TransitionEvent,
        channel: ChannelKind,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> DispatchResult {
        let order = self.order_lock(&check.id, channel);
        let _ordered = order.lock().await;

        match self
            .budget
            .try_consume(&event.user_id, check.tier, channel, now)
            .await
        {
            Ok(BudgetDecision::Allowed) => {}
            Ok(BudgetDecision::Suppressed { window, count, max }) => {
                tracing::info!(
                    user_id = %event.user_id,
                    channel = channel.as_str(),
                    ?window,
                    count,
                    max,
                    "alert suppressed by budget"
                );
                return DispatchResult::Suppressed { reason: SuppressReason::Budget };
            }
            Err(e) => return DispatchResult::Failed { error: e.to_string() },
        }

        let sent = match channel {
            ChannelKind::Webhook => self.webhook.send(sub, check, event).await,
            ChannelKind::Email => self.email.send(recipient, check, event).await,
            ChannelKind::Sms => self.sms.send(recipient, check, event).await,
        };
        match sent {
            Ok(()) => DispatchResult::Delivered,
            Err(e) => DispatchResult::Failed { error: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exit1_domain::check::CheckStatus;
    use exit1_domain::region::Region;
    use exit1_store::memory::MemoryStore;

    fn dispatcher(store: Arc<MemoryStore>) -> Dispatcher {
        Dispatcher::new(
            store.clone(),
            store,
            AlertsConfig::default(),
            Arc::new(Metrics::default()),
        )
        .unwrap()
    }

    fn event(kind: EventKind, failures: u32) -> TransitionEvent {
        TransitionEvent {
            kind,
            check_id: "c1".into(),
            user_id: "u1".into(),
            region: Region::default(),
            at: Utc::now(),
            previous_status: CheckStatus::Online,
            new_status: CheckStatus::Offline,
            failures_at_emit: failures,
            last_error: Some("timeout".into()),
        }
    }

    #[test]
    fn eligibility_enforces_threshold() {
        let mut sub = AlertSubscription::new("u1");
        sub.min_consecutive_events = 3;
        let check = Check::new("u1", "api", "https://example.com", 60);
        assert!(!Dispatcher::eligible(&sub, &check, &event(EventKind::WentOffline, 2)));
        assert!(Dispatcher::eligible(&sub, &check, &event(EventKind::WentOffline, 3)));
    }

    #[test]
    fn recovery_threshold_uses_pre_reset_count() {
        let mut sub = AlertSubscription::new("u1");
        sub.min_consecutive_events = 3;
        let check = Check::new("u1", "api", "https://example.com", 60);
        // came_online carries the pre-recovery failure count.
        assert!(Dispatcher::eligible(&sub, &check, &event(EventKind::CameOnline, 5)));
        assert!(!Dispatcher::eligible(&sub, &check, &event(EventKind::CameOnline, 1)));
    }

    #[test]
    fn disabled_check_blocks_all_but_auto_disable() {
        let sub = AlertSubscription::new("u1");
        let mut check = Check::new("u1", "api", "https://example.com", 60);
        check.disabled = true;
        assert!(!Dispatcher::eligible(&sub, &check, &event(EventKind::WentOffline, 1)));
        assert!(Dispatcher::eligible(&sub, &check, &event(EventKind::AutoDisabled, 9)));
    }

    #[tokio::test]
    async fn no_subscription_means_no_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store);
        let check = Check::new("u1", "api", "https://example.com", 60);
        let results = d
            .dispatch_event(&check, &event(EventKind::WentOffline, 1), Utc::now())
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn duplicate_within_window_is_suppressed() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store.clone());

        let mut sub = AlertSubscription::new("u1");
        // Email channel with no provider endpoint: delivery fails, but the
        // dedupe decision is what this test observes.
        sub.email = Some("ops@example.com".into());
        store.put_subscription(sub).await.unwrap();

        let check = Check::new("u1", "api", "https://example.com", 60);
        let now = Utc::now();
        let first = d.dispatch_event(&check, &event(EventKind::WentOffline, 1), now).await;
        assert!(matches!(first[0].1, DispatchResult::Failed { .. }));

        let second = d
            .dispatch_event(&check, &event(EventKind::WentOffline, 1), now + Duration::seconds(10))
            .await;
        assert_eq!(
            second[0].1,
            DispatchResult::Suppressed { reason: SuppressReason::Duplicate }
        );

        // Past the 60 s window the same tuple dispatches again.
        let third = d
            .dispatch_event(&check, &event(EventKind::WentOffline, 1), now + Duration::seconds(61))
            .await;
        assert!(matches!(third[0].1, DispatchResult::Failed { .. }));
    }

    #[tokio::test]
    async fn prune_clears_expired_dedupe_entries() {
        let store = Arc::new(MemoryStore::new());
        let d = dispatcher(store);
        let now = Utc::now();
        d.mark_dispatched(&event(EventKind::WentOffline, 1), now);
        assert_eq!(d.recent.lock().len(), 1);
        d.prune(now + Duration::seconds(120));
        assert!(d.recent.lock().is_empty());
    }
}
