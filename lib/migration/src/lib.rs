//! Workflow migration engine for flowshift.
//!
//! Moves workflow definitions between two instances of a workflow-automation
//! platform while keeping cross-workflow call references intact. Identifiers
//! are assigned by the destination on creation, so a transfer runs as a
//! state machine:
//!
//! - **Validate**: duplicate identifiers, duplicate names and unresolved
//!   call references are detected before any network call
//! - **Build graph**: call dependencies are ordered with Kahn's algorithm
//! - **Upload (create)**: each workflow is created and its new identifier is
//!   recorded in the [`IdMapping`]
//! - **Remap**: every call reference is rewritten to destination identifiers
//! - **Upload (update)**: the remapped payloads overwrite the created ones
//! - **Verify**: the destination is checked against the source
//!
//! The destination is reached through the [`WorkflowTransport`] trait.

pub mod error;
pub mod graph;
pub mod history;
pub mod mapping;
pub mod orchestrator;
pub mod reference;
pub mod remap;
pub mod state;
pub mod transport;
pub mod validate;
pub mod verify;
pub mod workflow;

pub use error::{GraphError, MigrationError, RemapError, StoreError};
pub use graph::{GraphStatistics, TopologicalOrder, WorkflowGraph};
pub use history::{UploadHistory, UploadPhase, UploadRecord, UploadStatus};
pub use mapping::{IdMapping, MappingEntry};
pub use orchestrator::{
    PlannedAction, PlannedOperation, StoragePaths, TransferOptions, TransferOrchestrator,
    TransferOutcome, TransferStatus, UploadFailure,
};
pub use reference::{CallReference, ReferencePolicy};
pub use remap::{RemapOutcome, Remapper};
pub use state::TransferState;
pub use transport::{InMemoryTransport, TransportError, WorkflowFilter, WorkflowTransport};
pub use validate::{
    UnresolvedReference, ValidationOptions, ValidationReport, Validator, WorkflowSummary,
};
pub use verify::{CheckKind, CheckResult, MigrationVerifier, VerificationReport};
pub use workflow::{Node, Workflow};
