//! Webhook channel — signed JSON POST with bounded retry.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use exit1_domain::check::Check;
use exit1_domain::config::AlertsConfig;
use exit1_domain::event::{EventKind, TransitionEvent};
use exit1_domain::subscription::AlertSubscription;
use exit1_domain::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookChannel {
    client: reqwest::Client,
    config: AlertsConfig,
}

impl WebhookChannel {
    pub fn new(config: AlertsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.webhook_timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Deliver one event. Retries on connect failure / 5xx / 408 / 429 with
    /// the configured backoff; any other non-2xx is terminal.
    pub async fn send(
        &self,
        sub: &AlertSubscription,
        check: &Check,
        event: &TransitionEvent,
    ) -> Result<()> {
        let url = sub
            .webhook_url
            .as_deref()
            .ok_or_else(|| Error::Config("subscription has no webhook url".into()))?;

        let body = if is_slack_url(url) {
            serde_json::to_vec(&slack_payload(check, event))?
        } else {
            serde_json::to_vec(&payload(check, event))?
        };

        let mut last_err = String::new();
        let max_retries = self.config.webhook_max_retries;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = self
                    .config
                    .webhook_retry_backoff_ms
                    .get((attempt - 1) as usize)
                    .or(self.config.webhook_retry_backoff_ms.last())
                    .copied()
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json");
            for (name, value) in &sub.webhook_headers {
                req = req.header(name, value);
            }
            if let Some(secret) = &sub.webhook_secret {
                req = req.header("X-Signature", format!("sha256={}", sign(secret, &body)));
            }

            match req.body(body.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if retryable_status(status.as_u16()) {
                        last_err = format!("webhook answered {status}");
                        tracing::debug!(url, attempt, %status, "webhook retryable status");
                        continue;
                    }
                    return Err(Error::Http(format!("webhook answered {status}")));
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_err = e.to_string();
                    tracing::debug!(url, attempt, error = %e, "webhook connect failure");
                    continue;
                }
                Err(e) => return Err(Error::Http(e.to_string())),
            }
        }
        Err(Error::Http(format!("webhook retries exhausted: {last_err}")))
    }
}

/// HMAC-SHA256 over the exact JSON body, hex-encoded.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Standard payload shape consumed by user endpoints.
pub fn payload(check: &Check, event: &TransitionEvent) -> serde_json::Value {
    serde_json::json!({
        "event": event.kind,
        "timestamp": event.at.timestamp_millis(),
        "website": {
            "id": check.id,
            "name": check.name,
            "url": check.url,
            "status": event.new_status,
            "response_time": check.last_response_time_ms,
            "last_error": event.last_error,
        },
        "previous_status": event.previous_status,
        "user_id": check.user_id,
    })
}

/// Slack-compatible payload: a single `text` line.
pub fn slack_payload(check: &Check, event: &TransitionEvent) -> serde_json::Value {
    let verb = match event.kind {
        EventKind::WentOffline => "is DOWN",
        EventKind::CameOnline => "is back UP",
        EventKind::ErrorObserved => "error changed",
        EventKind::AutoDisabled => "was disabled after sustained failures",
    };
    let detail = event
        .last_error
        .as_deref()
        .map(|e| format!(" ({e})"))
        .unwrap_or_default();
    serde_json::json!({
        "text": format!("{} {} {}{}", check.name, check.url, verb, detail),
    })
}

pub fn is_slack_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "hooks.slack.com"))
        .unwrap_or(false)
}

/// 5xx plus the two retryable 4xx codes.
pub fn retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use exit1_domain::check::CheckStatus;
    use exit1_domain::region::Region;

    fn event(kind: EventKind) -> TransitionEvent {
        TransitionEvent {
            kind,
            check_id: "c1".into(),
            user_id: "u1".into(),
            region: Region::default(),
            at: Utc::now(),
            previous_status: CheckStatus::Online,
            new_status: CheckStatus::Offline,
            failures_at_emit: 1,
            last_error: Some("timeout".into()),
        }
    }

    #[test]
    fn signature_is_stable_hex() {
        let sig = sign("secret", b"{\"a\":1}");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, sign("secret", b"{\"a\":1}"));
        assert_ne!(sig, sign("other", b"{\"a\":1}"));
    }

    #[test]
    fn payload_carries_documented_fields() {
        let check = Check::new("u1", "api", "https://example.com", 60);
        let p = payload(&check, &event(EventKind::WentOffline));
        assert_eq!(p["event"], "went_offline");
        assert_eq!(p["website"]["url"], "https://example.com");
        assert_eq!(p["previous_status"], "online");
        assert_eq!(p["user_id"], "u1");
        assert!(p["timestamp"].is_i64());
    }

    #[test]
    fn slack_detection_is_host_based() {
        assert!(is_slack_url("https://hooks.slack.com/services/T/B/x"));
        assert!(!is_slack_url("https://example.com/hooks.slack.com"));
        assert!(!is_slack_url("not a url"));
    }

    #[test]
    fn slack_payload_is_text_only() {
        let check = Check::new("u1", "api", "https://example.com", 60);
        let p = slack_payload(&check, &event(EventKind::CameOnline));
        assert!(p["text"].as_str().unwrap().contains("back UP"));
        assert!(p.get("website").is_none());
    }

    #[test]
    fn retryable_statuses() {
        assert!(retryable_status(500));
        assert!(retryable_status(503));
        assert!(retryable_status(408));
        assert!(retryable_status(429));
        assert!(!retryable_status(400));
        assert!(!retryable_status(404));
        assert!(!retryable_status(301));
    }
}
