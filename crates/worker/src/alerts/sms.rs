//! SMS channel — short text handed to an opaque provider API.
//! Single attempt; provider-side retries are not modeled.

use std::time::Duration;

use exit1_domain::check::Check;
use exit1_domain::config::SmsProviderConfig;
use exit1_domain::event::{EventKind, TransitionEvent};
use exit1_domain::{Error, Result};

const MAX_SMS_CHARS: usize = 160;

pub struct SmsChannel {
    client: reqwest::Client,
    config: SmsProviderConfig,
}

impl SmsChannel {
    pub fn new(config: SmsProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub async fn send(&self, to: &str, check: &Check, event: &TransitionEvent) -> Result<()> {
        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("sms provider endpoint not configured".into()))?;
        let api_key = std::env::var(&self.config.api_key_env)
            .map_err(|_| Error::Config(format!("{} not set", self.config.api_key_env)))?;

        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "to": to,
                "body": render_text(check, event),
            }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http(format!("sms provider answered {}", resp.status())))
        }
    }
}

pub fn render_text(check: &Check, event: &TransitionEvent) -> String {
    let verb = match event.kind {
        EventKind::WentOffline => "DOWN",
        EventKind::CameOnline => "UP",
        EventKind::ErrorObserved => "ERROR",
        EventKind::AutoDisabled => "DISABLED",
    };
    let mut text = format!("exit1: {} {} ({})", check.name, verb, check.url);
    if text.len() > MAX_SMS_CHARS {
        let mut end = MAX_SMS_CHARS;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
