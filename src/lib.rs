//! askrelay - rate-limited relay between chat users and a hosted AI endpoint.
//!
//! Features:
//! - Model registry mapping short keys to upstream model ids
//! - Per-role sliding-window rate limiting
//! - Usage statistics by model, user, day and hour
//! - Normalization of inconsistent upstream response shapes
//! - Chat command front end and an HTTP API

pub mod api;
pub mod bot;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logger;
pub mod normalize;
pub mod notify;
pub mod rate_limit;
pub mod registry;
pub mod roles;
pub mod upstream;
pub mod usage;
