//! Transfer orchestrator.
//!
//! Drives one migration run through the [`TransferState`] machine:
//! 1. Validate the batch (strict or report mode)
//! 2. Build the dependency graph and a processing order
//! 3. Create every workflow at the destination, recording new identifiers
//! 4. Remap every call reference with the completed mapping
//! 5. Overwrite each created workflow with its remapped payload
//! 6. Verify the destination against the source
//!
//! Steps 3, 5 and the verification fetches are the only network phases.
//! Each runs with at most `concurrency` calls in flight and completes fully
//! before the next step starts, so a workflow is never updated before its
//! own creation succeeded.

use crate::error::MigrationError;
use crate::graph::WorkflowGraph;
use crate::history::{UploadHistory, UploadPhase, UploadRecord};
use crate::mapping::IdMapping;
use crate::reference::ReferencePolicy;
use crate::remap::Remapper;
use crate::state::TransferState;
use crate::transport::{TransportError, WorkflowTransport};
use crate::validate::{UnresolvedReference, ValidationOptions, ValidationReport, Validator};
use crate::verify::{MigrationVerifier, VerificationReport};
use crate::workflow::Workflow;
use flowshift_core::{ReportExt, TransferRunId, WorkflowId};
use futures::StreamExt;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Knobs for a transfer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Compute the plan without touching the destination.
    pub dry_run: bool,
    /// Keep going after a per-workflow transport failure.
    pub skip_errors: bool,
    /// Abort when validation finds any issue.
    pub strict_validation: bool,
    /// Abort when a call reference has no mapping entry.
    pub strict_remap: bool,
    /// Reuse creations recorded in the upload history by earlier runs.
    pub skip_existing: bool,
    /// Maximum number of destination calls in flight.
    pub concurrency: usize,
    /// Keys that carry call references.
    pub reference_policy: ReferencePolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_errors: true,
            strict_validation: false,
            strict_remap: false,
            skip_existing: false,
            concurrency: 4,
            reference_policy: ReferencePolicy::default(),
        }
    }
}

/// Where the orchestrator persists its stores during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    /// ID mapping file (JSON).
    pub mapping: PathBuf,
    /// Upload history file (JSON Lines).
    pub history: PathBuf,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Everything was migrated and verified (or the dry-run plan is complete).
    Success,
    /// Some workflows were migrated, but not all, or verification failed.
    PartialFailure,
    /// Nothing was migrated.
    TotalFailure,
}

/// What the run intends to do with one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Create the workflow at the destination.
    Create,
    /// Reuse the copy created by an earlier run.
    Reuse { new_id: WorkflowId },
}

/// One entry of the migration plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedOperation {
    pub id: WorkflowId,
    pub name: String,
    #[serde(flatten)]
    pub action: PlannedAction,
}

/// A recorded per-workflow failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub name: String,
    pub old_id: WorkflowId,
    pub phase: UploadPhase,
    pub message: String,
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub run_id: TransferRunId,
    pub status: TransferStatus,
    /// Terminal state (`Done` or `Failed`).
    pub state: TransferState,
    pub dry_run: bool,
    /// Workflows in the batch.
    pub total: usize,
    /// Workflows created by this run.
    pub created: usize,
    /// Workflows not created: reused from an earlier run or never attempted.
    pub skipped: usize,
    /// Workflows whose creation failed.
    pub failed: usize,
    /// Workflows overwritten with their remapped payload.
    pub updated: usize,
    /// Workflows whose remapped update failed.
    pub update_failed: usize,
    pub elapsed: Duration,
    /// Dependency-ordered prefix of the processing sequence.
    pub order: Vec<WorkflowId>,
    /// Workflows that could not be ordered, processed after `order`.
    pub cycle: Vec<WorkflowId>,
    pub plan: Vec<PlannedOperation>,
    pub validation: Option<ValidationReport>,
    /// Call references the remap phase left unchanged for lack of a mapping entry.
    pub unresolved: Vec<UnresolvedReference>,
    pub verification: Option<VerificationReport>,
    pub failures: Vec<UploadFailure>,
    /// The error that moved the run to `Failed`, if any.
    pub error: Option<MigrationError>,
}

impl TransferOutcome {
    /// Returns true for a verified success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }

    /// Converts a non-successful outcome into an error report.
    ///
    /// # Errors
    ///
    /// Returns the run's error, or the first recorded transport failure.
    pub fn into_result(self) -> Result<Self, Report<MigrationError>> {
        if self.is_success() {
            return Ok(self);
        }
        let error = self.error.clone().or_else(|| {
            self.failures
                .first()
                .map(|failure| MigrationError::TransportFailure {
                    workflow: failure.name.clone(),
                    phase: failure.phase,
                    message: failure.message.clone(),
                })
        });
        match error {
            Some(error) => Err(error.into()),
            None => Ok(self),
        }
    }
}

/// Counters accumulated while a run progresses.
#[derive(Debug)]
struct RunProgress {
    run_id: TransferRunId,
    started: Instant,
    dry_run: bool,
    total: usize,
    created: usize,
    reused: usize,
    not_attempted: usize,
    failed: usize,
    updated: usize,
    update_failed: usize,
    order: Vec<WorkflowId>,
    cycle: Vec<WorkflowId>,
    plan: Vec<PlannedOperation>,
    validation: Option<ValidationReport>,
    unresolved: Vec<UnresolvedReference>,
    verification: Option<VerificationReport>,
    failures: Vec<UploadFailure>,
}

impl RunProgress {
    fn new(total: usize, dry_run: bool) -> Self {
        Self {
            run_id: TransferRunId::new(),
            started: Instant::now(),
            dry_run,
            total,
            created: 0,
            reused: 0,
            not_attempted: 0,
            failed: 0,
            updated: 0,
            update_failed: 0,
            order: Vec::new(),
            cycle: Vec::new(),
            plan: Vec::new(),
            validation: None,
            unresolved: Vec::new(),
            verification: None,
            failures: Vec::new(),
        }
    }

    fn record_failure(&mut self, workflow: &Workflow, phase: UploadPhase, error: &TransportError) {
        warn!(workflow = %workflow.name, old_id = %workflow.id, %phase, error = %error, "upload failed");
        match phase {
            UploadPhase::Create => self.failed += 1,
            UploadPhase::Update => self.update_failed += 1,
        }
        self.failures.push(UploadFailure {
            name: workflow.name.clone(),
            old_id: workflow.id.clone(),
            phase,
            message: error.to_string(),
        });
    }

    fn finish(self, state: TransferState, error: Option<MigrationError>) -> TransferOutcome {
        let migrated = self.created + self.reused;
        let clean = error.is_none() && self.failed == 0 && self.update_failed == 0;
        let status = if clean {
            TransferStatus::Success
        } else if migrated == 0 {
            TransferStatus::TotalFailure
        } else {
            TransferStatus::PartialFailure
        };

        TransferOutcome {
            run_id: self.run_id,
            status,
            state,
            dry_run: self.dry_run,
            total: self.total,
            created: self.created,
            skipped: self.reused + self.not_attempted,
            failed: self.failed,
            updated: self.updated,
            update_failed: self.update_failed,
            elapsed: self.started.elapsed(),
            order: self.order,
            cycle: self.cycle,
            plan: self.plan,
            validation: self.validation,
            unresolved: self.unresolved,
            verification: self.verification,
            failures: self.failures,
            error,
        }
    }
}

/// Runs `call` for every item with at most `limit` calls in flight.
///
/// Results come back in item order. `None` marks an item that was never
/// started because an earlier failure stopped the phase; calls already in
/// flight when that happens are allowed to finish.
async fn run_bounded<'a, I, F, Fut>(
    items: &'a [I],
    limit: usize,
    skip_errors: bool,
    call: F,
) -> Vec<Option<Result<Workflow, TransportError>>>
where
    F: Fn(&'a I) -> Fut,
    Fut: Future<Output = Result<Workflow, TransportError>>,
{
    let abort = AtomicBool::new(false);
    let abort = &abort;
    let call = &call;

    futures::stream::iter(items)
        .map(|item| async move {
            if abort.load(Ordering::SeqCst) {
                return None;
            }
            let result = call(item).await;
            if result.is_err() && !skip_errors {
                abort.store(true, Ordering::SeqCst);
            }
            Some(result)
        })
        .buffered(limit.max(1))
        .collect()
        .await
}

/// The transfer orchestrator.
///
/// Owns the destination transport and the two run stores. A single
/// orchestrator is the only writer of the stores during a run.
pub struct TransferOrchestrator<T: WorkflowTransport> {
    transport: T,
    mapping: IdMapping,
    history: UploadHistory,
    storage: Option<StoragePaths>,
    state: TransferState,
    transitions: Vec<TransferState>,
}

impl<T: WorkflowTransport> TransferOrchestrator<T> {
    /// Creates an orchestrator with empty stores.
    pub fn new(transport: T) -> Self {
        Self::with_stores(transport, IdMapping::new(), UploadHistory::new())
    }

    /// Creates an orchestrator that continues from existing stores.
    pub fn with_stores(transport: T, mapping: IdMapping, history: UploadHistory) -> Self {
        Self {
            transport,
            mapping,
            history,
            storage: None,
            state: TransferState::Idle,
            transitions: vec![TransferState::Idle],
        }
    }

    /// Persists both stores to `paths` during every run.
    #[must_use]
    pub fn persist_to(mut self, paths: StoragePaths) -> Self {
        self.storage = Some(paths);
        self
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Returns every state visited by the latest run, starting with `Idle`.
    #[must_use]
    pub fn transitions(&self) -> &[TransferState] {
        &self.transitions
    }

    /// Returns the ID mapping.
    #[must_use]
    pub fn mapping(&self) -> &IdMapping {
        &self.mapping
    }

    /// Returns the upload history.
    #[must_use]
    pub fn history(&self) -> &UploadHistory {
        &self.history
    }

    /// Returns the destination transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consumes the orchestrator and returns its stores.
    #[must_use]
    pub fn into_stores(self) -> (IdMapping, UploadHistory) {
        (self.mapping, self.history)
    }

    fn transition(&mut self, next: TransferState) -> Result<(), Report<MigrationError>> {
        if !self.state.can_transition_to(next) {
            return Err(MigrationError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }

    fn persist(&mut self) -> Result<(), Report<MigrationError>> {
        let Some(paths) = &self.storage else {
            return Ok(());
        };
        self.mapping
            .persist(&paths.mapping)
            .map_err(|e| MigrationError::Persistence {
                what: "id mapping".to_string(),
                details: e.context_message(),
            })?;
        self.history
            .persist(&paths.history)
            .map_err(|e| MigrationError::Persistence {
                what: "upload history".to_string(),
                details: e.context_message(),
            })?;
        Ok(())
    }

    /// Moves the run to `Failed`, persists progress and builds the outcome.
    fn fail(
        &mut self,
        progress: RunProgress,
        error: MigrationError,
    ) -> Result<TransferOutcome, Report<MigrationError>> {
        warn!(state = %self.state, error = %error, "transfer failed");
        self.transition(TransferState::Failed)?;
        self.persist()?;
        Ok(progress.finish(TransferState::Failed, Some(error)))
    }

    /// Returns the destination id of an earlier creation of `workflow`.
    fn reusable(&self, workflow: &Workflow) -> Option<WorkflowId> {
        let record = self.history.find_created(&workflow.name)?;
        if record.old_id != workflow.id {
            return None;
        }
        record.new_id.clone()
    }

    /// Runs a complete transfer of `workflows` to the destination.
    ///
    /// Migration failures are reported in the returned outcome; only
    /// persistence failures and internal state errors are returned as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be persisted.
    #[instrument(skip_all, fields(workflows = workflows.len(), dry_run = options.dry_run))]
    pub async fn transfer(
        &mut self,
        workflows: &[Workflow],
        options: &TransferOptions,
    ) -> Result<TransferOutcome, Report<MigrationError>> {
        self.state = TransferState::Idle;
        self.transitions = vec![TransferState::Idle];
        let mut progress = RunProgress::new(workflows.len(), options.dry_run);
        info!(run_id = %progress.run_id, "starting transfer");

        // Validation
        self.transition(TransferState::Validating)?;
        let validator = Validator::new(ValidationOptions {
            strict: options.strict_validation,
            reference_policy: options.reference_policy.clone(),
        });
        match validator.validate(workflows) {
            Ok(report) => progress.validation = Some(report),
            Err(error) => {
                if let MigrationError::ValidationFailed { report } = &error {
                    progress.validation = Some(report.clone());
                }
                return self.fail(progress, error);
            }
        }

        // Graph and plan
        self.transition(TransferState::BuildingGraph)?;
        let graph = match WorkflowGraph::from_workflows(workflows, &options.reference_policy) {
            Ok((graph, unresolved)) => {
                for edge in &unresolved {
                    debug!(from = %edge.from, to = %edge.to, "reference outside batch");
                }
                graph
            }
            Err(error) => return self.fail(progress, error.into()),
        };
        let topo = graph.topological_order();
        if !topo.is_acyclic() {
            warn!(cyclic = topo.cycle.len(), "call graph contains a cycle");
        }

        let by_id: HashMap<&WorkflowId, &Workflow> =
            workflows.iter().map(|workflow| (&workflow.id, workflow)).collect();
        let sequence: Vec<&Workflow> = topo
            .processing_sequence()
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect();

        progress.order = topo.order;
        progress.cycle = topo.cycle;
        progress.plan = sequence
            .iter()
            .map(|workflow| {
                let action = match self.reusable(workflow) {
                    Some(new_id) if options.skip_existing => PlannedAction::Reuse { new_id },
                    _ => PlannedAction::Create,
                };
                PlannedOperation {
                    id: workflow.id.clone(),
                    name: workflow.name.clone(),
                    action,
                }
            })
            .collect();

        if options.dry_run {
            info!(planned = progress.plan.len(), "dry run complete");
            self.transition(TransferState::Done)?;
            return Ok(progress.finish(TransferState::Done, None));
        }

        // Pass 1: create
        self.transition(TransferState::UploadingInitial)?;
        let run_id = progress.run_id;
        let mut migrated: Vec<&Workflow> = Vec::new();
        let mut to_create: Vec<&Workflow> = Vec::new();
        let actions: Vec<PlannedAction> =
            progress.plan.iter().map(|op| op.action.clone()).collect();
        for (&workflow, action) in sequence.iter().zip(actions) {
            match action {
                PlannedAction::Reuse { new_id } => {
                    debug!(workflow = %workflow.name, %new_id, "reusing earlier creation");
                    self.mapping
                        .add(workflow.id.clone(), new_id.clone(), workflow.name.clone());
                    self.history.add(UploadRecord::skipped(
                        run_id,
                        UploadPhase::Create,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        Some(new_id),
                        "already created by an earlier run",
                    ));
                    progress.reused += 1;
                    migrated.push(workflow);
                }
                PlannedAction::Create => to_create.push(workflow),
            }
        }

        let transport = &self.transport;
        let results = run_bounded(&to_create, options.concurrency, options.skip_errors, |w| {
            transport.create(w)
        })
        .await;

        let mut aborted = Vec::new();
        for (&workflow, result) in to_create.iter().zip(results) {
            match result {
                Some(Ok(created)) => {
                    debug!(workflow = %workflow.name, old_id = %workflow.id, new_id = %created.id, "created");
                    self.mapping
                        .add(workflow.id.clone(), created.id.clone(), workflow.name.clone());
                    self.history.add(UploadRecord::success(
                        run_id,
                        UploadPhase::Create,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        created.id,
                    ));
                    progress.created += 1;
                    migrated.push(workflow);
                }
                Some(Err(error)) => {
                    progress.record_failure(workflow, UploadPhase::Create, &error);
                    self.history.add(UploadRecord::failed(
                        run_id,
                        UploadPhase::Create,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        error.to_string(),
                    ));
                    aborted.push(workflow.name.clone());
                }
                None => {
                    self.history.add(UploadRecord::skipped(
                        run_id,
                        UploadPhase::Create,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        None,
                        "not attempted after an earlier failure",
                    ));
                    progress.not_attempted += 1;
                }
            }
        }
        info!(
            created = progress.created,
            reused = progress.reused,
            failed = progress.failed,
            "creation phase finished"
        );
        self.persist()?;

        if !options.skip_errors && !aborted.is_empty() {
            return self.fail(
                progress,
                MigrationError::PhaseAborted {
                    phase: UploadPhase::Create,
                    failed: aborted,
                },
            );
        }

        // Remap
        self.transition(TransferState::Remapping)?;
        let remapper = Remapper::new(&self.mapping)
            .with_policy(options.reference_policy.clone())
            .strict(options.strict_remap);
        let mut remapped: Vec<(&Workflow, WorkflowId, Workflow)> = Vec::with_capacity(migrated.len());
        let mut remap_error = None;
        for &workflow in &migrated {
            let Some(new_id) = self.mapping.resolve(&workflow.id).cloned() else {
                continue;
            };
            match remapper.remap(workflow) {
                Ok(outcome) => {
                    if !outcome.unresolved.is_empty() {
                        warn!(workflow = %workflow.name, unresolved = outcome.unresolved.len(), "call references left unresolved");
                    }
                    progress.unresolved.extend(outcome.unresolved.iter().map(|to| {
                        UnresolvedReference {
                            from: workflow.id.clone(),
                            to: to.clone(),
                        }
                    }));
                    remapped.push((workflow, new_id, outcome.workflow));
                }
                Err(error) => {
                    remap_error = Some(error);
                    break;
                }
            }
        }
        if let Some(error) = remap_error {
            return self.fail(progress, error.into());
        }

        // Pass 2: update
        self.transition(TransferState::UploadingFinal)?;
        let transport = &self.transport;
        let results = run_bounded(
            &remapped,
            options.concurrency,
            options.skip_errors,
            |(_, new_id, payload)| transport.update(new_id, payload),
        )
        .await;

        let mut aborted = Vec::new();
        for ((workflow, new_id, _), result) in remapped.iter().zip(results) {
            match result {
                Some(Ok(_)) => {
                    self.history.add(UploadRecord::success(
                        run_id,
                        UploadPhase::Update,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        new_id.clone(),
                    ));
                    progress.updated += 1;
                }
                Some(Err(error)) => {
                    progress.record_failure(workflow, UploadPhase::Update, &error);
                    self.history.add(UploadRecord::failed(
                        run_id,
                        UploadPhase::Update,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        error.to_string(),
                    ));
                    aborted.push(workflow.name.clone());
                }
                None => {
                    self.history.add(UploadRecord::skipped(
                        run_id,
                        UploadPhase::Update,
                        workflow.name.clone(),
                        workflow.id.clone(),
                        Some(new_id.clone()),
                        "not attempted after an earlier failure",
                    ));
                }
            }
        }
        info!(updated = progress.updated, failed = progress.update_failed, "update phase finished");

        if !options.skip_errors && !aborted.is_empty() {
            return self.fail(
                progress,
                MigrationError::PhaseAborted {
                    phase: UploadPhase::Update,
                    failed: aborted,
                },
            );
        }

        // Verify
        self.transition(TransferState::Verifying)?;
        let originals: Vec<Workflow> = migrated.into_iter().cloned().collect();
        let report = self.verify_against_destination(&originals, options).await;
        progress.verification = Some(report.clone());

        if !report.passed {
            return self.fail(progress, MigrationError::VerificationFailed { report });
        }

        self.transition(TransferState::Done)?;
        self.persist()?;
        let outcome = progress.finish(TransferState::Done, None);
        let elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(status = ?outcome.status, elapsed_ms, "transfer finished");
        Ok(outcome)
    }

    /// Fetches the destination copy of every mapped workflow in `originals`
    /// and runs the migration verifier.
    #[instrument(skip_all, fields(workflows = originals.len()))]
    pub async fn verify_destination(
        &self,
        originals: &[Workflow],
        options: &TransferOptions,
    ) -> VerificationReport {
        self.verify_against_destination(originals, options).await
    }

    async fn verify_against_destination(
        &self,
        originals: &[Workflow],
        options: &TransferOptions,
    ) -> VerificationReport {
        let new_ids: Vec<WorkflowId> = originals
            .iter()
            .filter_map(|workflow| self.mapping.resolve(&workflow.id).cloned())
            .collect();

        let transport = &self.transport;
        let fetched = run_bounded(&new_ids, options.concurrency, true, |id| transport.get(id)).await;

        let mut snapshot = Vec::with_capacity(fetched.len());
        for (id, result) in new_ids.iter().zip(fetched) {
            match result {
                Some(Ok(workflow)) => snapshot.push(workflow),
                Some(Err(error)) => {
                    warn!(new_id = %id, error = %error, "could not fetch destination workflow");
                }
                None => {}
            }
        }

        let report = MigrationVerifier::new()
            .with_policy(options.reference_policy.clone())
            .verify(originals, &self.mapping, &snapshot);
        debug!(passed = report.passed, "verification finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemapError;
    use crate::history::UploadStatus;
    use crate::transport::InMemoryTransport;
    use crate::verify::CheckKind;
    use crate::workflow::Node;
    use serde_json::json;
    use std::sync::Arc;

    fn id(raw: &str) -> WorkflowId {
        WorkflowId::new(raw)
    }

    fn trigger() -> Node {
        Node::new("Start", "n8n-nodes-base.manualTrigger", json!({}))
    }

    /// W1 has no dependencies; W2 calls W1 by its source id.
    fn pair() -> Vec<Workflow> {
        vec![
            Workflow::new("2", "W2")
                .with_node(trigger())
                .with_call_to("Call W1", &id("1")),
            Workflow::new("1", "W1").with_node(trigger()),
        ]
    }

    fn setup(
        transport: InMemoryTransport,
    ) -> (Arc<InMemoryTransport>, TransferOrchestrator<Arc<InMemoryTransport>>) {
        let transport = Arc::new(transport);
        let orchestrator = TransferOrchestrator::new(Arc::clone(&transport));
        (transport, orchestrator)
    }

    #[tokio::test]
    async fn end_to_end_remaps_call_reference() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());

        let outcome = orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        assert_eq!(outcome.status, TransferStatus::Success);
        assert_eq!(outcome.state, TransferState::Done);
        assert_eq!((outcome.created, outcome.failed, outcome.updated), (2, 0, 2));
        assert_eq!(outcome.order, vec![id("1"), id("2")]);

        let w1_new = orchestrator.mapping().resolve(&id("1")).cloned().expect("W1 mapped");
        let w2_dest = transport.find_by_name("W2").expect("W2 at destination");
        assert_eq!(w2_dest.nodes[1].parameters["workflowId"], json!(w1_new.as_str()));

        let verification = outcome.verification.expect("verified");
        assert!(verification.passed);
        assert_eq!(verification.checks.len(), 4);
        assert!(verification.checks.iter().all(|check| check.passed));

        assert_eq!(
            orchestrator.transitions(),
            &[
                TransferState::Idle,
                TransferState::Validating,
                TransferState::BuildingGraph,
                TransferState::UploadingInitial,
                TransferState::Remapping,
                TransferState::UploadingFinal,
                TransferState::Verifying,
                TransferState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn failed_creation_is_partial_failure() {
        let (transport, mut orchestrator) =
            setup(InMemoryTransport::new().failing_create("W2"));

        let outcome = orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.status, TransferStatus::PartialFailure);
        assert_eq!(outcome.failures[0].name, "W2");
        assert_eq!(outcome.failures[0].phase, UploadPhase::Create);

        // Only W1 was verified.
        let verification = outcome.verification.as_ref().expect("verification ran");
        assert!(verification.passed);
        assert_eq!(transport.get_calls(), 1);
        assert_eq!(transport.update_calls(), 1);

        assert!(outcome.into_result().is_err());
    }

    #[tokio::test]
    async fn dry_run_touches_nothing_and_matches_live_order() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let options = TransferOptions {
            dry_run: true,
            ..Default::default()
        };

        let plan = orchestrator.transfer(&pair(), &options).await.expect("dry run");
        assert!(plan.dry_run);
        assert_eq!(plan.status, TransferStatus::Success);
        assert_eq!(transport.create_calls(), 0);
        assert_eq!(transport.update_calls(), 0);
        assert_eq!(transport.get_calls(), 0);
        assert_eq!(
            orchestrator.transitions().last(),
            Some(&TransferState::Done)
        );
        assert!(plan.plan.iter().all(|op| op.action == PlannedAction::Create));

        let (_, mut live) = setup(InMemoryTransport::new());
        let live_outcome = live
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("live run");
        assert_eq!(plan.order, live_outcome.order);
        let planned: Vec<&WorkflowId> = plan.plan.iter().map(|op| &op.id).collect();
        let created: Vec<&WorkflowId> = live
            .history()
            .records()
            .iter()
            .filter(|r| r.phase == UploadPhase::Create)
            .map(|r| &r.old_id)
            .collect();
        assert_eq!(planned, created);
    }

    #[tokio::test]
    async fn strict_validation_aborts_before_network() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let workflows = vec![Workflow::new("1", "x"), Workflow::new("1", "y")];
        let options = TransferOptions {
            strict_validation: true,
            ..Default::default()
        };

        let outcome = orchestrator.transfer(&workflows, &options).await.expect("transfer");

        assert_eq!(outcome.status, TransferStatus::TotalFailure);
        assert_eq!(outcome.state, TransferState::Failed);
        assert!(matches!(outcome.error, Some(MigrationError::ValidationFailed { .. })));
        assert_eq!(outcome.validation.expect("report").duplicate_ids.len(), 1);
        assert_eq!(transport.create_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_fail_graph_construction_in_report_mode() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let workflows = vec![Workflow::new("1", "x"), Workflow::new("1", "y")];

        let outcome = orchestrator
            .transfer(&workflows, &TransferOptions::default())
            .await
            .expect("transfer");

        assert_eq!(outcome.status, TransferStatus::TotalFailure);
        assert!(matches!(outcome.error, Some(MigrationError::Graph(_))));
        assert!(!outcome.validation.expect("report").valid);
        assert_eq!(transport.create_calls(), 0);
    }

    #[tokio::test]
    async fn no_skip_errors_stops_starting_new_creations() {
        let (transport, mut orchestrator) =
            setup(InMemoryTransport::new().failing_create("b"));
        let workflows = vec![
            Workflow::new("1", "a"),
            Workflow::new("2", "b"),
            Workflow::new("3", "c"),
        ];
        let options = TransferOptions {
            skip_errors: false,
            concurrency: 1,
            ..Default::default()
        };

        let outcome = orchestrator.transfer(&workflows, &options).await.expect("transfer");

        assert_eq!(outcome.state, TransferState::Failed);
        assert_eq!(outcome.status, TransferStatus::PartialFailure);
        assert_eq!((outcome.created, outcome.failed, outcome.skipped), (1, 1, 1));
        assert_eq!(transport.create_calls(), 2);
        assert_eq!(transport.update_calls(), 0);
        assert!(matches!(
            outcome.error,
            Some(MigrationError::PhaseAborted { phase: UploadPhase::Create, .. })
        ));

        let c = orchestrator.history().find_by_name("c").expect("record for c");
        assert_eq!(c.status, UploadStatus::Skipped);
    }

    #[tokio::test]
    async fn abort_lets_in_flight_creation_finish() {
        let (transport, mut orchestrator) = setup(
            InMemoryTransport::new()
                .failing_create("a")
                .with_latency(Duration::from_millis(20)),
        );
        let workflows = vec![
            Workflow::new("1", "a"),
            Workflow::new("2", "b"),
            Workflow::new("3", "c"),
            Workflow::new("4", "d"),
        ];
        let options = TransferOptions {
            skip_errors: false,
            concurrency: 2,
            ..Default::default()
        };

        let outcome = orchestrator.transfer(&workflows, &options).await.expect("transfer");

        // "b" was in flight alongside the failing "a" and ran to completion.
        assert_eq!(transport.max_in_flight(), 2);
        assert_eq!(transport.create_calls(), 2);
        assert!(orchestrator.mapping().resolve(&id("2")).is_some());
        let b = orchestrator.history().find_by_name("b").expect("record for b");
        assert_eq!(b.status, UploadStatus::Success);

        for name in ["c", "d"] {
            let record = orchestrator.history().find_by_name(name).expect("record");
            assert_eq!(record.status, UploadStatus::Skipped);
        }

        assert_eq!(outcome.state, TransferState::Failed);
        assert_eq!((outcome.created, outcome.failed, outcome.skipped), (1, 1, 2));
        assert_eq!(transport.update_calls(), 0);
        match outcome.error {
            Some(MigrationError::PhaseAborted { phase, failed }) => {
                assert_eq!(phase, UploadPhase::Create);
                assert_eq!(failed, vec!["a".to_string()]);
            }
            other => panic!("expected an aborted create phase, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_creation_failing_is_total_failure() {
        let (_, mut orchestrator) = setup(
            InMemoryTransport::new()
                .failing_create("W1")
                .failing_create("W2"),
        );

        let outcome = orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        assert_eq!(outcome.status, TransferStatus::TotalFailure);
        assert_eq!(outcome.failed, 2);
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        let (transport, mut orchestrator) =
            setup(InMemoryTransport::new().with_latency(Duration::from_millis(10)));
        let workflows: Vec<Workflow> = (0..9)
            .map(|n| Workflow::new(n.to_string(), format!("wf-{n}")))
            .collect();
        let options = TransferOptions {
            concurrency: 3,
            ..Default::default()
        };

        let outcome = orchestrator.transfer(&workflows, &options).await.expect("transfer");

        assert!(outcome.is_success());
        assert!(transport.max_in_flight() <= 3);
        assert!(transport.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn failed_update_is_caught_by_verification() {
        let (_, mut orchestrator) = setup(InMemoryTransport::new().failing_update("W2"));

        let outcome = orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        assert_eq!(outcome.update_failed, 1);
        assert_eq!(outcome.state, TransferState::Failed);
        assert_eq!(outcome.status, TransferStatus::PartialFailure);
        let report = outcome.verification.expect("verification ran");
        let integrity = report
            .check(CheckKind::ReferenceIntegrity)
            .expect("integrity check");
        assert!(!integrity.passed);
        assert_eq!(integrity.affected, vec!["W2".to_string()]);
        assert!(matches!(outcome.error, Some(MigrationError::VerificationFailed { .. })));
    }

    #[tokio::test]
    async fn strict_remap_fails_after_creation() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let workflows = vec![Workflow::new("1", "a").with_call_to("Call", &id("404"))];
        let options = TransferOptions {
            strict_remap: true,
            ..Default::default()
        };

        let outcome = orchestrator.transfer(&workflows, &options).await.expect("transfer");

        assert_eq!(outcome.state, TransferState::Failed);
        assert_eq!(outcome.status, TransferStatus::PartialFailure);
        assert!(matches!(outcome.error, Some(MigrationError::Remap(_))));
        assert_eq!(transport.create_calls(), 1);
        assert_eq!(transport.update_calls(), 0);
    }

    /// "caller" calls "dst-2", which is not in the batch but is the id the
    /// destination assigns to "other".
    fn overlapping_ids() -> Vec<Workflow> {
        vec![
            Workflow::new("1", "caller").with_call_to("Call", &id("dst-2")),
            Workflow::new("2", "other"),
        ]
    }

    #[tokio::test]
    async fn dangling_reference_matching_a_new_id_fails_strict_remap() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let options = TransferOptions {
            strict_remap: true,
            ..Default::default()
        };

        let outcome = orchestrator
            .transfer(&overlapping_ids(), &options)
            .await
            .expect("transfer");

        assert_eq!(orchestrator.mapping().resolve(&id("2")), Some(&id("dst-2")));
        assert_eq!(outcome.state, TransferState::Failed);
        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.error,
            Some(MigrationError::Remap(RemapError::UnresolvedReference { ref reference, .. }))
                if *reference == id("dst-2")
        ));
        assert_eq!(transport.update_calls(), 0);
    }

    #[tokio::test]
    async fn dangling_reference_matching_a_new_id_is_reported() {
        let (_, mut orchestrator) = setup(InMemoryTransport::new());

        let outcome = orchestrator
            .transfer(&overlapping_ids(), &TransferOptions::default())
            .await
            .expect("transfer");

        assert_eq!(
            outcome.unresolved,
            vec![UnresolvedReference {
                from: id("1"),
                to: id("dst-2"),
            }]
        );
    }

    #[tokio::test]
    async fn cyclic_workflows_are_still_migrated() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let workflows = vec![
            Workflow::new("1", "ping").with_call_to("Call pong", &id("2")),
            Workflow::new("2", "pong").with_call_to("Call ping", &id("1")),
        ];

        let outcome = orchestrator
            .transfer(&workflows, &TransferOptions::default())
            .await
            .expect("transfer");

        assert!(outcome.is_success());
        assert!(outcome.order.is_empty());
        assert_eq!(outcome.cycle, vec![id("1"), id("2")]);

        let ping = transport.find_by_name("ping").expect("ping");
        let pong = transport.find_by_name("pong").expect("pong");
        assert_eq!(ping.nodes[0].parameters["workflowId"], json!(pong.id.as_str()));
        assert_eq!(pong.nodes[0].parameters["workflowId"], json!(ping.id.as_str()));
    }

    #[tokio::test]
    async fn rerun_with_skip_existing_reuses_creations() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut first = TransferOrchestrator::new(Arc::clone(&transport));
        first
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("first run");
        let (mapping, history) = first.into_stores();

        let mut second = TransferOrchestrator::with_stores(Arc::clone(&transport), mapping, history);
        let options = TransferOptions {
            skip_existing: true,
            ..Default::default()
        };
        let outcome = second.transfer(&pair(), &options).await.expect("second run");

        assert!(outcome.is_success());
        assert_eq!((outcome.created, outcome.skipped), (0, 2));
        assert_eq!(transport.create_calls(), 2);
        assert_eq!(transport.workflows().len(), 2);
        assert!(outcome
            .plan
            .iter()
            .all(|op| matches!(op.action, PlannedAction::Reuse { .. })));
    }

    #[tokio::test]
    async fn history_records_every_attempt_of_the_run() {
        let (_, mut orchestrator) = setup(InMemoryTransport::new());
        let outcome = orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        let records: Vec<&UploadRecord> = orchestrator.history().for_run(outcome.run_id).collect();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.status == UploadStatus::Success));
        assert_eq!(
            records.iter().filter(|r| r.phase == UploadPhase::Update).count(),
            2
        );
    }

    #[tokio::test]
    async fn stores_are_persisted_when_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = StoragePaths {
            mapping: dir.path().join("id_mapping.json"),
            history: dir.path().join("upload_history.jsonl"),
        };
        let mut orchestrator =
            TransferOrchestrator::new(InMemoryTransport::new()).persist_to(paths.clone());

        orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        let mapping = IdMapping::load(&paths.mapping).expect("load mapping");
        assert_eq!(&mapping, orchestrator.mapping());
        let history = UploadHistory::load(&paths.history).expect("load history");
        assert_eq!(history.records(), orchestrator.history().records());
    }

    #[tokio::test]
    async fn verify_destination_rechecks_previous_run() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        orchestrator
            .transfer(&pair(), &TransferOptions::default())
            .await
            .expect("transfer");

        let report = orchestrator
            .verify_destination(&pair(), &TransferOptions::default())
            .await;
        assert!(report.passed);
        assert_eq!(transport.get_calls(), 4);
    }

    #[tokio::test]
    async fn empty_batch_succeeds() {
        let (transport, mut orchestrator) = setup(InMemoryTransport::new());
        let outcome = orchestrator
            .transfer(&[], &TransferOptions::default())
            .await
            .expect("transfer");

        assert!(outcome.is_success());
        assert_eq!(outcome.total, 0);
        assert_eq!(transport.create_calls(), 0);
    }
}
