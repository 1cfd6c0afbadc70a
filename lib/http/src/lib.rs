//! HTTP transport for flowshift.
//!
//! Implements [`flowshift_migration::WorkflowTransport`] against the public
//! REST API of a workflow-automation platform instance (`/api/v1/workflows`),
//! with cursor pagination and retries for transient failures.

pub mod client;
pub mod config;

pub use client::HttpTransport;
pub use config::{DEFAULT_API_KEY_HEADER, HttpTransportConfig, RetryConfig};
