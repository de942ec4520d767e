use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::types::now_iso;

const USER_AGENT: &str = concat!("dispatchd-webhook/", env!("CARGO_PKG_VERSION"));

/// Ceiling for the exponential backoff between delivery attempts.
const BACKOFF_CAP: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub enabled: bool,
    pub default_url: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_url: None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

/// Result of one delivery, after all retries.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { status: u16, attempt: u32 },
    Failed { error: String, attempt: u32 },
    Skipped { reason: String },
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// At-least-once delivery of lifecycle events to an HTTP callback.
/// Delivery never blocks or fails the caller; `send` is fire-and-forget.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    settings: WebhookSettings,
}

impl WebhookDispatcher {
    pub fn new(settings: WebhookSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, settings }
    }

    /// Dispatch an event in the background. Failures are logged, never
    /// propagated.
    pub fn send(self: &Arc<Self>, event: impl Into<String>, data: Value, url_override: Option<String>) {
        let dispatcher = self.clone();
        let event = event.into();
        tokio::spawn(async move {
            let outcome = dispatcher
                .deliver(&event, &data, url_override.as_deref())
                .await;
            match outcome {
                DeliveryOutcome::Delivered { status, attempt } => {
                    debug!("Webhook '{}' delivered ({}; attempt {})", event, status, attempt);
                }
                DeliveryOutcome::Failed { error, attempt } => {
                    warn!(
                        "Webhook '{}' failed after {} attempt(s): {}",
                        event, attempt, error
                    );
                }
                DeliveryOutcome::Skipped { reason } => {
                    debug!("Webhook '{}' skipped: {}", event, reason);
                }
            }
        });
    }

    /// Deliver one event, retrying with bounded exponential backoff.
    /// A per-delivery URL override takes precedence over the configured
    /// default; with neither, the delivery is skipped.
    pub async fn deliver(
        &self,
        event: &str,
        data: &Value,
        url_override: Option<&str>,
    ) -> DeliveryOutcome {
        if !self.settings.enabled {
            return DeliveryOutcome::Skipped {
                reason: "disabled".to_string(),
            };
        }
        let Some(url) = url_override
            .map(|u| u.to_string())
            .or_else(|| self.settings.default_url.clone())
        else {
            return DeliveryOutcome::Skipped {
                reason: "no_url".to_string(),
            };
        };

        let envelope = serde_json::json!({
            "event": event,
            "timestamp": now_iso(),
            "data": data,
        });

        let mut last_error = String::new();
        for attempt in 1..=self.settings.max_retries.max(1) {
            match self.client.post(&url).json(&envelope).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        info!(
                            "Delivered '{}' to {} (attempt {})",
                            event, url, attempt
                        );
                        return DeliveryOutcome::Delivered {
                            status: status.as_u16(),
                            attempt,
                        };
                    }
                    last_error = format!("HTTP {}", status.as_u16());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            if attempt < self.settings.max_retries.max(1) {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        DeliveryOutcome::Failed {
            error: last_error,
            attempt: self.settings.max_retries.max(1),
        }
    }
}

/// `min(1s * 2^(attempt-1), 10s)`
fn backoff(attempt: u32) -> Duration {
    let exp = Duration::from_secs(1u64 << (attempt.saturating_sub(1)).min(16));
    exp.min(BACKOFF_CAP)
}
