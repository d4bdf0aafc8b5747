//! Unified error handling for askrelay.
//!
//! Every dispatch failure is a [`RelayError`]; none of them escape the
//! dispatcher. Each variant knows its log tag and the text the user sees.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds a dispatch can end in.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Prompt was empty or whitespace only.
    #[error("empty prompt")]
    EmptyInput,
    /// Requested model key is not in the registry.
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    /// User exceeded their per-minute quota.
    #[error("rate limited: {quota} requests per minute")]
    RateLimited { quota: u32, retry_after: Duration },
    /// Upstream did not answer within the call timeout.
    #[error("upstream timed out after {}s", .0.as_secs())]
    UpstreamTimeout(Duration),
    /// Connection failure, non-2xx status, or an undecodable body.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),
    /// Upstream flagged success but carried an error message.
    #[error("upstream error: {0}")]
    UpstreamLogical(String),
    /// Upstream payload matched none of the known shapes.
    #[error("unrecognized upstream response: {0}")]
    UnrecognizedShape(Value),
}

impl RelayError {
    /// Stable tag for logs and API responses.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::UnknownModel(_) => "unknown_model",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::UpstreamTransport(_) => "upstream_transport_error",
            Self::UpstreamLogical(_) => "upstream_logical_error",
            Self::UnrecognizedShape(_) => "unrecognized_upstream_shape",
        }
    }

    /// True for failures that are rejected before any upstream call.
    pub fn is_pre_upstream(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::UnknownModel(_) | Self::RateLimited { .. }
        )
    }

    /// Text sent back to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => {
                "Please provide a question. Usage: /ask <your question>".to_string()
            }
            Self::UnknownModel(key) => format!(
                "Unknown model '{}'. Use /models to see what is available.",
                key
            ),
            Self::RateLimited { quota, retry_after } => format!(
                "Rate limit reached ({} requests per minute). Try again in {}s.",
                quota,
                retry_after.as_secs().max(1)
            ),
            Self::UpstreamTimeout(_) => {
                "The request timed out. Please try again later.".to_string()
            }
            Self::UpstreamTransport(cause) => format!(
                "An error occurred while contacting the AI service: {}",
                cause
            ),
            Self::UpstreamLogical(msg) => format!("API Error: {}", msg),
            Self::UnrecognizedShape(raw) => format!(
                "Unexpected response format from the AI service:\n{}",
                raw
            ),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
