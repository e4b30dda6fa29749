//! HTTP Client Utilities
//!
//! Shared HTTP client creation with consistent configuration.

use std::time::Duration;

use super::{PackError, PackResult};

/// Create a reqwest HTTP client with the given request timeout
pub fn create_http_client(timeout_secs: u64) -> PackResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PackError::Config(format!("Failed to build HTTP client: {}", e)))
}
