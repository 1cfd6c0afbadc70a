//! Error types for the migration crate.
//!
//! Each concern has its own enum; fallible APIs return them inside a
//! `rootcause::Report`:
//! - `GraphError`: workflow graph construction (duplicates, unknown ids)
//! - `RemapError`: reference rewriting in strict mode
//! - `StoreError`: persistence of the ID mapping, upload history and batches
//! - `MigrationError`: run-level failures (graph and remap errors convert via `From`)

use crate::history::UploadPhase;
use crate::validate::ValidationReport;
use crate::verify::VerificationReport;
use flowshift_core::WorkflowId;
use std::fmt;

/// Errors from graph operations.
///
/// These are construction-time errors: they are raised before any network
/// call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A workflow with this identifier was already added.
    DuplicateIdentifier { id: WorkflowId },
    /// A workflow with this name but a different identifier was already added.
    DuplicateName {
        name: String,
        existing: WorkflowId,
        incoming: WorkflowId,
    },
    /// A dependency names a workflow that is not in the graph.
    UnknownWorkflow { id: WorkflowId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateIdentifier { id } => {
                write!(f, "duplicate workflow identifier: {id}")
            }
            Self::DuplicateName {
                name,
                existing,
                incoming,
            } => {
                write!(
                    f,
                    "duplicate workflow name '{name}' (already used by {existing}, rejected {incoming})"
                )
            }
            Self::UnknownWorkflow { id } => write!(f, "unknown workflow: {id}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from reference remapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapError {
    /// A call reference has no entry in the ID mapping (strict mode only).
    UnresolvedReference {
        workflow: String,
        node: String,
        reference: WorkflowId,
    },
}

impl fmt::Display for RemapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedReference {
                workflow,
                node,
                reference,
            } => {
                write!(
                    f,
                    "unresolved call reference to {reference} in node '{node}' of workflow '{workflow}'"
                )
            }
        }
    }
}

impl std::error::Error for RemapError {}

/// Errors from durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reading or writing the file failed.
    Io { path: String, details: String },
    /// The file contents could not be parsed.
    Parse {
        path: String,
        line: Option<usize>,
        details: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, details } => write!(f, "i/o error on '{path}': {details}"),
            Self::Parse {
                path,
                line: Some(line),
                details,
            } => write!(f, "failed to parse '{path}' at line {line}: {details}"),
            Self::Parse {
                path,
                line: None,
                details,
            } => write!(f, "failed to parse '{path}': {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Run-level migration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationError {
    /// The workflow graph could not be built.
    Graph(GraphError),
    /// Remapping failed in strict mode.
    Remap(RemapError),
    /// Validation found duplicates or unresolved references (strict mode).
    ValidationFailed { report: ValidationReport },
    /// A transport call for one workflow failed.
    TransportFailure {
        workflow: String,
        phase: UploadPhase,
        message: String,
    },
    /// An upload phase stopped early because errors are not skipped.
    PhaseAborted {
        phase: UploadPhase,
        failed: Vec<String>,
    },
    /// The destination does not match the source.
    VerificationFailed { report: VerificationReport },
    /// The orchestrator was asked to make an illegal state transition.
    InvalidStateTransition { from: String, to: String },
    /// Persisting run state failed.
    Persistence { what: String, details: String },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(e) => write!(f, "graph error: {e}"),
            Self::Remap(e) => write!(f, "remap error: {e}"),
            Self::ValidationFailed { report } => {
                write!(
                    f,
                    "validation failed: {} duplicate id group(s), {} duplicate name group(s), {} unresolved reference(s)",
                    report.duplicate_ids.len(),
                    report.duplicate_names.len(),
                    report.unresolved_references.len()
                )
            }
            Self::TransportFailure {
                workflow,
                phase,
                message,
            } => write!(f, "{phase} of workflow '{workflow}' failed: {message}"),
            Self::PhaseAborted { phase, failed } => {
                write!(
                    f,
                    "{phase} phase aborted after failures: {}",
                    failed.join(", ")
                )
            }
            Self::VerificationFailed { report } => {
                let failing: Vec<String> = report
                    .failing_checks()
                    .map(|check| check.kind.to_string())
                    .collect();
                write!(f, "verification failed: {}", failing.join(", "))
            }
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid state transition from {from} to {to}")
            }
            Self::Persistence { what, details } => {
                write!(f, "failed to persist {what}: {details}")
            }
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<GraphError> for MigrationError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<RemapError> for MigrationError {
    fn from(e: RemapError) -> Self {
        Self::Remap(e)
    }
}
