use crate::config::NotifyConfig;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Alert channel for run-level failures. Delivery is best effort; a broken
/// channel must never change the outcome of a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alert(&self, subject: &str, body: &str);
}

/// Posts alerts as JSON to a webhook endpoint.
pub struct WebhookNotifier {
    url: String,
    pipeline: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str, pipeline: &str) -> Self {
        Self {
            url: url.to_string(),
            pipeline: pipeline.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn alert(&self, subject: &str, body: &str) {
        let payload = json!({
            "pipeline": self.pipeline,
            "subject": subject,
            "body": body,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(r) if r.status().is_success() => {}
            Ok(r) => {
                warn!(
                    status = r.status().as_u16(),
                    subject, "webhook alert was not accepted"
                );
            }
            Err(e) => {
                warn!(subject, "failed to deliver webhook alert: {}", e);
            }
        }
    }
}

/// Fallback channel when no webhook is configured: the alert only lands in
/// the structured log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, subject: &str, body: &str) {
        warn!(subject, body, "pipeline alert");
    }
}

pub fn create_notifier(config: &NotifyConfig, pipeline: &str) -> Arc<dyn Notifier> {
    if !config.on_failure {
        return Arc::new(LogNotifier);
    }
    let url = std::env::var("DWH_WEBHOOK_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config.webhook_url.clone());
    match url {
        Some(url) => Arc::new(WebhookNotifier::new(&url, pipeline)),
        None => Arc::new(LogNotifier),
    }
}
