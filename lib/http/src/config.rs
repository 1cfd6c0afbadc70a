//! HTTP transport configuration.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header the platform's public API reads the key from.
pub const DEFAULT_API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Connection settings for one platform instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// Instance root, e.g. `https://n8n.example.com`.
    pub base_url: String,
    /// API key sent with every request. Empty means no key.
    pub api_key: String,
    pub api_key_header: String,
    pub timeout_secs: u64,
    /// Page size for listing.
    pub page_size: u32,
    pub retry: RetryConfig,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5678".to_string(),
            api_key: String::new(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            timeout_secs: 30,
            page_size: 100,
            retry: RetryConfig::default(),
        }
    }
}

impl HttpTransportConfig {
    /// Creates a config for `base_url` with default settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry/backoff policy (defaults to 3 attempts with jittered exponential backoff).
///
/// Creation (`POST`) is not idempotent, so it is only retried when
/// `retry_post` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub retry_post: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 300,
            max_backoff_ms: 5_000,
            retry_post: false,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether the given status code should trigger a retry for this method.
    #[must_use]
    pub fn should_retry_status(&self, method: &Method, status: StatusCode) -> bool {
        let transient = status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error();
        transient && self.allow_for_method(method)
    }

    /// Whether the given request error should trigger a retry.
    #[must_use]
    pub fn should_retry_error(&self, method: &Method, err: &reqwest::Error) -> bool {
        (err.is_timeout() || err.is_connect()) && self.allow_for_method(method)
    }

    /// Jittered exponential backoff for the given attempt (1-indexed).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let max = Duration::from_millis(self.max_backoff_ms);
        let base = Duration::from_millis(self.base_backoff_ms).saturating_mul(2u32.pow(exp));
        let capped = base.min(max);
        let jitter = 0.5 + fastrand::f64();
        Duration::from_secs_f64((capped.as_secs_f64() * jitter).min(max.as_secs_f64()))
    }

    fn allow_for_method(&self, method: &Method) -> bool {
        *method != Method::POST || self.retry_post
    }
}
