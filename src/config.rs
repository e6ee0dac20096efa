//! Aggregator and endpoint configuration.
//!
//! Both configs load from environment variables with defaults that match the
//! production client (batch of 5, 3 second debounce).

use std::env;
use std::time::Duration;

pub const DEFAULT_BATCH_THRESHOLD: usize = 5;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 3_000;
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Pending size that flushes immediately. Clamped to at least 1.
    pub batch_threshold: usize,

    /// Debounce window before a partial batch is flushed.
    pub batch_delay: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
        }
    }
}

impl AggregatorConfig {
    /// Environment variables:
    /// - `VIEW_BATCH_THRESHOLD` (default: 5)
    /// - `VIEW_BATCH_DELAY_MS` (default: 3000)
    pub fn from_env() -> Self {
        Self {
            batch_threshold: env::var("VIEW_BATCH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_THRESHOLD),

            batch_delay: Duration::from_millis(
                env::var("VIEW_BATCH_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BATCH_DELAY_MS),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,

    /// Sent as a bearer token when present.
    pub auth_token: Option<String>,

    /// Transport-level timeout. The aggregator itself enforces none.
    pub timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            timeout: Duration::from_millis(DEFAULT_API_TIMEOUT_MS),
        }
    }
}

impl EndpointConfig {
    /// Environment variables:
    /// - `VIEW_API_BASE_URL` (default: http://localhost:5000/api)
    /// - `VIEW_API_TOKEN` (default: unset)
    /// - `VIEW_API_TIMEOUT_MS` (default: 10000)
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("VIEW_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),

            auth_token: env::var("VIEW_API_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),

            timeout: Duration::from_millis(
                env::var("VIEW_API_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_API_TIMEOUT_MS),
            ),
        }
    }
}
