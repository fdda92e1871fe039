// src/notify.rs
// Outbound webhook notification after a completed run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";

/// Post-run notification sink. The webhook implementation is the production
/// path; tests substitute their own.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, date: &str, llm_result: &serde_json::Value) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub struct WebhookNotifier {
    url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    /// POSTs `{date, source, llm_result}`. An unset URL is a no-op, not an
    /// error.
    async fn send(&self, date: &str, llm_result: &serde_json::Value) -> Result<()> {
        let Some(url) = &self.url else {
            tracing::debug!("webhook disabled (no WEBHOOK_URL)");
            return Ok(());
        };

        let body = serde_json::json!({
            "date": date,
            "source": "rss",
            "llm_result": llm_result,
        });

        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
