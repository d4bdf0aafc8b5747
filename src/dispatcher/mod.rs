//! Request dispatch: admission, upstream call, normalization, recording.
//!
//! A request moves through
//!
//! ```text
//! Received ─┬─ empty prompt ──────────────▶ [Rejected]
//!           ├─ unknown model ─────────────▶ [Rejected]
//!           └─ AdmissionChecked ─┬─ over quota ─▶ [Rejected]
//!                                └─ UpstreamCalled ─┬─ timeout ───▶ [Failed]
//!                                                   ├─ transport ─▶ [Failed]
//!                                                   └─ Recorded ─▶ Normalized ─▶ [Delivered | Failed]
//! ```
//!
//! Every path ends in exactly one [`Reply`]. Nothing is retried.

#[cfg(test)]
mod tests;

use crate::config::{Config, LogVerbosity};
use crate::error::{ConfigError, RelayError};
use crate::http::{ASK_TIMEOUT, STATUS_TIMEOUT};
use crate::logger::{format_dispatch, DispatchSummary};
use crate::normalize::{normalize, Outcome};
use crate::notify::AdminNotifier;
use crate::rate_limit::RateLimiter;
use crate::registry::{ModelRegistry, ModelSpec, DEFAULT_MODEL_KEY};
use crate::roles::{RoleStore, UserId};
use crate::upstream::UpstreamClient;
use crate::usage::UsageRecorder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Prompt sent by the status probe.
pub const PROBE_PROMPT: &str = "Reply with the single word: pong";

/// One normalized inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub user_id: UserId,
    pub model_key: String,
    pub prompt: String,
}

impl DispatchRequest {
    pub fn new(user_id: impl Into<UserId>, model_key: Option<&str>, prompt: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            model_key: model_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .unwrap_or(DEFAULT_MODEL_KEY)
                .to_string(),
            prompt: prompt.into(),
        }
    }
}

/// Terminal state of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Delivered,
    /// Refused before any upstream call.
    Rejected,
    /// Failed at or after the upstream call.
    Failed,
}

/// The single outbound message for a request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub user_id: UserId,
    pub text: String,
    /// Display name of the resolved model, if resolution got that far.
    pub model: Option<String>,
    pub status: DispatchStatus,
    pub error: Option<RelayError>,
}

impl Reply {
    pub fn is_delivered(&self) -> bool {
        self.status == DispatchStatus::Delivered
    }
}

/// Outbound side of the transport.
pub trait ReplySink {
    fn send(&self, user: &UserId, text: String) -> impl Future<Output = ()> + Send;
}

/// Result of a status probe.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub ok: bool,
    pub model: String,
    pub latency_ms: u64,
    pub detail: String,
    pub checked_at: DateTime<Utc>,
}

impl StatusReport {
    pub fn to_message(&self) -> String {
        if self.ok {
            format!(
                "AI service is online.\nModel: {}\nLatency: {}ms",
                self.model, self.latency_ms
            )
        } else {
            format!(
                "AI service is not responding correctly.\nModel: {}\nLatency: {}ms\nDetail: {}",
                self.model, self.latency_ms, self.detail
            )
        }
    }
}

/// Tunables that do not belong to any single store.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub ask_timeout: Duration,
    pub status_timeout: Duration,
    /// Header replies from the default model too.
    pub reply_header: bool,
    pub verbosity: LogVerbosity,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            ask_timeout: ASK_TIMEOUT,
            status_timeout: STATUS_TIMEOUT,
            reply_header: true,
            verbosity: LogVerbosity::Compact,
        }
    }
}

/// Owns every piece of shared state. Build once, share behind an `Arc`.
pub struct Dispatcher {
    registry: ModelRegistry,
    limiter: RateLimiter,
    usage: UsageRecorder,
    upstream: UpstreamClient,
    notifier: AdminNotifier,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        registry: ModelRegistry,
        roles: RoleStore,
        upstream: UpstreamClient,
        notifier: AdminNotifier,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            limiter: RateLimiter::new(roles),
            usage: UsageRecorder::new(),
            upstream,
            notifier,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let settings = DispatchSettings {
            ask_timeout: config.upstream.ask_timeout(),
            status_timeout: config.upstream.status_timeout(),
            reply_header: config.app.reply_header,
            verbosity: config.app.log_verbosity,
        };
        Ok(Self::new(
            config.registry()?,
            config.role_store(),
            UpstreamClient::new(config.upstream.base_url.clone())?,
            AdminNotifier::from_config(&config.notify),
            settings,
        ))
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn roles(&self) -> &RoleStore {
        self.limiter.roles()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn usage(&self) -> &UsageRecorder {
        &self.usage
    }

    /// Periodically drop idle users from the limiter.
    pub fn spawn_limiter_sweep(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                dispatcher.limiter.sweep(Instant::now());
            }
        })
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Reply {
        self.dispatch_at(request, Instant::now()).await
    }

    /// Dispatch with an explicit admission time.
    pub async fn dispatch_at(&self, request: DispatchRequest, now: Instant) -> Reply {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            user = %request.user_id,
            model = %request.model_key
        );
        let started = Instant::now();

        let (model, result) = self.process(&request, now).instrument(span.clone()).await;
        let reply = self.build_reply(&request, model, result);

        let _entered = span.enter();
        let summary = DispatchSummary {
            request_id,
            user: request.user_id.to_string(),
            model: request.model_key.clone(),
            status: match &reply.error {
                Some(e) => e.error_type().to_string(),
                None => "delivered".to_string(),
            },
            latency_ms: started.elapsed().as_millis() as u64,
            prompt_chars: request.prompt.chars().count(),
            reply_chars: reply.text.chars().count(),
        };
        let line = format_dispatch(&summary, self.settings.verbosity);

        match (&reply.status, &reply.error) {
            (DispatchStatus::Failed, Some(err)) => {
                warn!("{}", line);
                self.notifier.notify(format!(
                    "Dispatch failed [{}] user={} model={}: {}",
                    err.error_type(),
                    request.user_id,
                    request.model_key,
                    err
                ));
            }
            _ => info!("{}", line),
        }

        reply
    }

    /// Dispatch and hand the reply to `sink` exactly once.
    pub async fn handle<S: ReplySink>(&self, request: DispatchRequest, sink: &S) -> Reply {
        let reply = self.dispatch(request).await;
        sink.send(&reply.user_id, reply.text.clone()).await;
        reply
    }

    async fn process<'a>(
        &'a self,
        request: &DispatchRequest,
        now: Instant,
    ) -> (Option<&'a ModelSpec>, Result<String, RelayError>) {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return (None, Err(RelayError::EmptyInput));
        }

        let Some(model) = self.registry.get(&request.model_key) else {
            return (None, Err(RelayError::UnknownModel(request.model_key.clone())));
        };

        if let Err(limited) = self.limiter.check(&request.user_id, now) {
            return (
                Some(model),
                Err(RelayError::RateLimited {
                    quota: limited.quota,
                    retry_after: limited.retry_after,
                }),
            );
        }

        let raw = match self
            .upstream
            .ask(prompt, &model.model_id, self.settings.ask_timeout)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return (Some(model), Err(e)),
        };

        // The call reached the upstream, so it counts whatever it says.
        self.usage.record(&request.user_id, &model.model_id, Utc::now());

        let result = match normalize(&raw) {
            Outcome::Text(text) => Ok(text),
            Outcome::UpstreamError(msg) => Err(RelayError::UpstreamLogical(msg)),
            Outcome::Unrecognized(raw) => Err(RelayError::UnrecognizedShape(raw)),
        };
        (Some(model), result)
    }

    fn build_reply(
        &self,
        request: &DispatchRequest,
        model: Option<&ModelSpec>,
        result: Result<String, RelayError>,
    ) -> Reply {
        let model_name = model.map(|m| m.display_name.clone());
        match result {
            Ok(text) => Reply {
                user_id: request.user_id.clone(),
                text: self.with_header(model, text),
                model: model_name,
                status: DispatchStatus::Delivered,
                error: None,
            },
            Err(err) => Reply {
                user_id: request.user_id.clone(),
                text: err.user_message(),
                model: model_name,
                status: if err.is_pre_upstream() {
                    DispatchStatus::Rejected
                } else {
                    DispatchStatus::Failed
                },
                error: Some(err),
            },
        }
    }

    fn with_header(&self, model: Option<&ModelSpec>, text: String) -> String {
        match model {
            Some(m) if self.settings.reply_header || !m.is_default() => {
                format!("{}:\n{}", m.display_name, text)
            }
            _ => text,
        }
    }

    /// Synthetic request against the default model. Bypasses admission
    /// and usage recording.
    pub async fn probe(&self) -> StatusReport {
        let model = self.registry.default_model();
        let started = Instant::now();
        let result = self
            .upstream
            .ask(PROBE_PROMPT, &model.model_id, self.settings.status_timeout)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (ok, detail) = match result.map(|raw| normalize(&raw)) {
            Ok(Outcome::Text(_)) => (true, "responding".to_string()),
            Ok(Outcome::UpstreamError(msg)) => (false, format!("upstream error: {}", msg)),
            Ok(Outcome::Unrecognized(_)) => (false, "unexpected response format".to_string()),
            Err(e) => (false, e.to_string()),
        };

        info!(ok, latency_ms, model = %model.key, "status probe finished");

        StatusReport {
            ok,
            model: model.display_name.clone(),
            latency_ms,
            detail,
            checked_at: Utc::now(),
        }
    }
}
