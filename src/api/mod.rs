//! HTTP transport for the relay.
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /v1/models - Registered models
//! - POST /v1/ask - Dispatch one normalized request
//! - POST /v1/messages - Handle a raw chat message (commands included)
//! - GET /v1/status - Probe the upstream
//! - GET /v1/stats - Usage snapshot

mod handlers;
mod types;


use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bot::Bot;
use crate::dispatcher::Dispatcher;

pub use handlers::status_for;
pub use types::*;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub bot: Bot,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            bot: Bot::new(Arc::clone(&dispatcher)),
            dispatcher,
        }
    }
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/ask", post(handlers::ask))
        .route("/v1/messages", post(handlers::message))
        .route("/v1/status", get(handlers::status))
        .route("/v1/stats", get(handlers::stats))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
