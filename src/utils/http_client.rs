use reqwest::Client;
use std::time::Duration;

use crate::error::AppError;

/// Shared client for third-party APIs (invoicing, rates, SMS, VIES).
pub fn new_api_client() -> Result<Client, AppError> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        // Below the usual 60s server keep-alive so stale connections aren't reused
        .pool_idle_timeout(Some(Duration::from_secs(50)))
        .tcp_keepalive(Duration::from_secs(60))
        .user_agent(concat!("washnet-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))
}
