//! HTTP handlers for the relay API.

use super::types::*;
use super::AppState;
use crate::dispatcher::{DispatchRequest, DispatchStatus, Reply, StatusReport};
use crate::error::RelayError;
use crate::usage::UsageSnapshot;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "askrelay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let data = state
        .dispatcher
        .registry()
        .iter()
        .map(|m| ModelInfo {
            key: m.key.clone(),
            id: m.model_id.clone(),
            name: m.display_name.clone(),
            default: m.is_default(),
        })
        .collect();

    Json(ModelsResponse {
        object: "list",
        data,
    })
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Response {
    let user = req.user_id;
    if user.as_str().is_empty() {
        return ApiError::bad_request("user_id is required").into_response();
    }

    let request = DispatchRequest::new(user, req.model.as_deref(), req.text);
    let reply = state.dispatcher.dispatch(request).await;

    (status_for(&reply), Json(ask_response(reply))).into_response()
}

pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let user = req.user_id;
    if user.as_str().is_empty() {
        return ApiError::bad_request("user_id is required").into_response();
    }

    let reply = state.bot.handle_message(&user, &req.text).await;
    Json(MessageResponse { reply }).into_response()
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    Json(state.dispatcher.probe().await)
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<UsageSnapshot> {
    Json(state.dispatcher.usage().snapshot())
}

fn ask_response(reply: Reply) -> AskResponse {
    AskResponse {
        error_type: reply.error.as_ref().map(RelayError::error_type),
        reply: reply.text,
        model: reply.model,
        status: reply.status,
    }
}

/// HTTP status for a finished dispatch. The body always carries the reply.
pub fn status_for(reply: &Reply) -> StatusCode {
    match (&reply.status, &reply.error) {
        (DispatchStatus::Delivered, _) => StatusCode::OK,
        (_, Some(RelayError::RateLimited { .. })) => StatusCode::TOO_MANY_REQUESTS,
        (_, Some(RelayError::EmptyInput | RelayError::UnknownModel(_))) => {
            StatusCode::BAD_REQUEST
        }
        (_, Some(RelayError::UpstreamTimeout(_))) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}
