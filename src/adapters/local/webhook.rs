//! Incoming-webhook notifier (Slack-compatible `{"text": ...}` payload).

use crate::domain::jobs::JobSummary;
use crate::ports::notifier::{NotifyError, Notifier};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub struct WebhookNotifier {
    client: Client,
    endpoint: Option<String>,
}

impl WebhookNotifier {
    /// With no `endpoint` every notification is silently skipped.
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, summary: &JobSummary) -> Result<(), NotifyError> {
        let Some(endpoint) = &self.endpoint else {
            debug!(job_id = %summary.job_id, "no webhook configured, skipping notification");
            return Ok(());
        };

        let body = json!({
            "text": summary.text(),
            "job_id": summary.job_id,
            "state": summary.state,
            "download_urls": summary.download_urls,
        });

        let resp = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "webhook returned non-success status");
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}
