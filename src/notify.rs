//! Optional forwarding of dispatch failures to an admin.
//!
//! When no webhook is configured the notifier is a no-op. Delivery
//! problems are logged and swallowed; they never affect the user's reply.

use crate::config::NotifyConfig;
use crate::http::{create_client_with_timeout, NOTIFY_TIMEOUT};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct NotifyPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
    text: &'a str,
}

#[derive(Clone)]
struct Target {
    client: Client,
    url: String,
    chat_id: Option<String>,
}

/// Admin notification channel.
#[derive(Clone, Default)]
pub struct AdminNotifier {
    target: Option<Target>,
}

impl AdminNotifier {
    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        let Some(url) = config.webhook_url.as_ref().filter(|u| !u.trim().is_empty()) else {
            return Self::disabled();
        };
        match create_client_with_timeout(NOTIFY_TIMEOUT) {
            Ok(client) => Self {
                target: Some(Target {
                    client,
                    url: url.clone(),
                    chat_id: config.admin_chat.clone(),
                }),
            },
            Err(e) => {
                warn!(error = %e, "admin notifications disabled: client setup failed");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Fire-and-forget: delivery runs on its own task.
    pub fn notify(&self, summary: String) {
        if !self.is_enabled() {
            return;
        }
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.send(&summary).await;
        });
    }

    /// Deliver a summary and wait for the attempt to finish.
    /// Returns whether the webhook accepted it.
    pub async fn send(&self, summary: &str) -> bool {
        let Some(target) = &self.target else {
            return false;
        };
        let payload = NotifyPayload {
            chat_id: target.chat_id.as_deref(),
            text: summary,
        };
        match target
            .client
            .post(&target.url)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(_) => {
                debug!("admin notified");
                true
            }
            Err(e) => {
                warn!(error = %e, "admin notification failed");
                false
            }
        }
    }
}
