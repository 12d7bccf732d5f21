//! Email channel — rendered HTML handed to an opaque provider API.
//! Single attempt; provider-side retries are not modeled.

use std::time::Duration;

use exit1_domain::check::Check;
use exit1_domain::config::EmailProviderConfig;
use exit1_domain::event::{EventKind, TransitionEvent};
use exit1_domain::{Error, Result};

pub struct EmailChannel {
    client: reqwest::Client,
    config: EmailProviderConfig,
}

impl EmailChannel {
    pub fn new(config: EmailProviderConfig) -> Result<Self> {
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
            .ok_or_else(|| Error::Config("email provider endpoint not configured".into()))?;
        let api_key = std::env::var(&self.config.api_key_env)
            .map_err(|_| Error::Config(format!("{} not set", self.config.api_key_env)))?;

        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "from": self.config.from,
                "to": to,
                "subject": subject(check, event),
                "html": render_html(check, event),
            }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http(format!("email provider answered {}", resp.status())))
        }
    }
}

pub fn subject(check: &Check, event: &TransitionEvent) -> String {
    match event.kind {
        EventKind::WentOffline => format!("🔴 {} is down", check.name),
        EventKind::CameOnline => format!("🟢 {} is back online", check.name),
        EventKind::ErrorObserved => format!("⚠️ {} error changed", check.name),
        EventKind::AutoDisabled => format!("⏸ {} was disabled", check.name),
    }
}

pub fn render_html(check: &Check, event: &TransitionEvent) -> String {
    let error_row = event
        .last_error
        .as_deref()
        .map(|e| format!("<p>Last error: <code>{}</code></p>", escape(e)))
        .unwrap_or_default();
    format!(
        "<html><body>\
         <h2>{}</h2>\
         <p><a href=\"{}\">{}</a> changed from <b>{:?}</b> to <b>{:?}</b>.</p>\
         {}\
         <p>Consecutive failures at this point: {}</p>\
         </body></html>",
        escape(&subject(check, event)),
        escape(&check.url),
        escape(&check.url),
        event.previous_status,
        event.new_status,
        error_row,
        event.failures_at_emit,
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
