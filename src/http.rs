//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration across the codebase.
//! Per-call deadlines are applied by the caller, not baked into the client.

use reqwest::Client;
use std::time::Duration;

/// Default deadline for an ask call (60 seconds).
pub const ASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for the status probe (10 seconds).
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for admin notifications (5 seconds).
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP connect deadline shared by every client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a new HTTP client with the shared connect timeout.
pub fn create_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("askrelay/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Create a new HTTP client with an overall request timeout.
pub fn create_client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .user_agent(concat!("askrelay/", env!("CARGO_PKG_VERSION")))
        .build()
}
