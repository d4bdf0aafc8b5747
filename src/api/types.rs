//! Request and response types for the relay HTTP API.

use crate::dispatcher::DispatchStatus;
use crate::roles::UserId;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

#[derive(Serialize)]
pub struct ModelInfo {
    pub key: String,
    pub id: String,
    pub name: String,
    pub default: bool,
}

/// A normalized inbound event. `user_id` may be a JSON integer or string.
#[derive(Deserialize, Serialize)]
pub struct AskRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub model: Option<String>,
    pub text: String,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub reply: String,
    pub model: Option<String>,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
}

/// A raw chat message, parsed as a command.
#[derive(Deserialize, Serialize)]
pub struct MessageRequest {
    pub user_id: UserId,
    pub text: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub reply: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned before a request reaches the dispatcher.
#[derive(Debug)]
pub struct ApiError {
    pub status: axum::http::StatusCode,
    pub message: String,
}

impl ApiError {
    /// Create a 400 Bad Request error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: axum::http::StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            axum::Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
