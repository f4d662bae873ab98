//! Operational notifications.

use arbiter_core::Symbol;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::Notifier;

/// Severity attached to outbound notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Posts notifications to a configured webhook. Delivery is best-effort:
/// failures are logged and swallowed so an unreachable endpoint can never
/// stall the decision path.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook: Option<String>,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(webhook: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, severity: Severity, symbol: &Symbol, message: &str) {
        let Some(url) = &self.webhook else {
            info!(
                target: "arbiter.alerts",
                severity = severity.as_str(),
                %symbol,
                message,
                "notification (no webhook configured)"
            );
            return;
        };
        let payload = json!({
            "severity": severity.as_str(),
            "symbol": symbol,
            "message": message,
        });
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    target: "arbiter.alerts",
                    status = %response.status(),
                    "webhook returned non-success"
                );
            }
            Err(err) => {
                warn!(target: "arbiter.alerts", error = %err, "webhook delivery failed");
            }
        }
    }
}

/// Discards every notification. Used in tests and replay runs.
#[derive(Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _severity: Severity, _symbol: &Symbol, _message: &str) {}
}
