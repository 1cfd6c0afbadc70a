//! Core types shared by the flowshift workflow migration crates.
//!
//! This crate provides the identifier types and the `Result` alias used
//! throughout the migration engine, the HTTP transport and the CLI.

pub mod error;
pub mod id;

pub use error::{ReportExt, Result};
pub use id::{ParseIdError, TransferRunId, WorkflowId};
