//! Client for the single upstream inference endpoint.
//!
//! Every model is reached through the same `POST base_url` with a JSON
//! body of `{"prompt", "model_id"}`. Deadlines are chosen per call so the
//! status probe can use a shorter one than a normal ask.

use crate::error::RelayError;
use crate::http::create_client;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upstream request body.
#[derive(Debug, Serialize)]
pub struct UpstreamRequest<'a> {
    pub prompt: &'a str,
    pub model_id: &'a str,
}

/// Thin wrapper around a shared reqwest client.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
}

impl UpstreamClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://provider2api.onrender.com/api/provider2";

    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        Ok(Self::with_client(create_client()?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Send one prompt and return the raw JSON body.
    ///
    /// No retries. A missed deadline is [`RelayError::UpstreamTimeout`];
    /// connection failures, non-2xx statuses and non-JSON bodies are
    /// [`RelayError::UpstreamTransport`].
    pub async fn ask(
        &self,
        prompt: &str,
        model_id: &str,
        deadline: Duration,
    ) -> Result<Value, RelayError> {
        let body = UpstreamRequest { prompt, model_id };

        match timeout(deadline, self.exchange(&body)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_timeout() => {
                warn!(model_id, "upstream request timed out in transport");
                Err(RelayError::UpstreamTimeout(deadline))
            }
            Ok(Err(e)) => {
                warn!(model_id, error = %e, "upstream request failed");
                Err(RelayError::UpstreamTransport(describe(&e)))
            }
            Err(_) => {
                warn!(model_id, deadline_secs = deadline.as_secs_f64(), "upstream request timed out");
                Err(RelayError::UpstreamTimeout(deadline))
            }
        }
    }

    async fn exchange(&self, body: &UpstreamRequest<'_>) -> Result<Value, reqwest::Error> {
        debug!(url = %self.base_url, model_id = body.model_id, "calling upstream");
        let response = self
            .client
            .post(&self.base_url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        response.json::<Value>().await
    }
}

/// Short, user-safe description of a reqwest failure.
fn describe(e: &reqwest::Error) -> String {
    if let Some(status) = e.status() {
        return format!("HTTP {}", status);
    }
    if e.is_connect() {
        return "could not connect to the AI service".to_string();
    }
    if e.is_decode() {
        return "response was not valid JSON".to_string();
    }
    e.to_string()
}
