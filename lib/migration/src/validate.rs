//! Duplicate and consistency validation.
//!
//! [`ValidationReport::scan`] is a pure function over a batch: one pass
//! builds identifier and name tables, then every key owned by more than one
//! workflow becomes a duplicate group. Whether a dirty report aborts the
//! caller is decided by [`Validator`] through [`ValidationOptions::strict`],
//! so the same scan runs on raw source data and on the batch about to be
//! uploaded.

use crate::error::MigrationError;
use crate::reference::ReferencePolicy;
use crate::workflow::Workflow;
use flowshift_core::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Identity of a workflow inside a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
        }
    }
}

/// A call reference whose target is not in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnresolvedReference {
    /// The calling workflow.
    pub from: WorkflowId,
    /// The missing target.
    pub to: WorkflowId,
}

/// Result of validating a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True when no issue was found.
    pub valid: bool,
    /// Groups of workflows sharing an identifier.
    pub duplicate_ids: Vec<Vec<WorkflowSummary>>,
    /// Groups of workflows with different identifiers sharing a name.
    pub duplicate_names: Vec<Vec<WorkflowSummary>>,
    /// References to identifiers absent from the batch.
    pub unresolved_references: Vec<UnresolvedReference>,
}

impl ValidationReport {
    /// Scans a batch and reports every collision and unresolved reference.
    #[must_use]
    pub fn scan(workflows: &[Workflow], policy: &ReferencePolicy) -> Self {
        // BTreeMap keeps groups in a stable order; members keep batch order.
        let mut by_id: BTreeMap<&WorkflowId, Vec<&Workflow>> = BTreeMap::new();
        let mut by_name: BTreeMap<&str, Vec<&Workflow>> = BTreeMap::new();
        for workflow in workflows {
            by_id.entry(&workflow.id).or_default().push(workflow);
            by_name.entry(&workflow.name).or_default().push(workflow);
        }

        let duplicate_ids: Vec<Vec<WorkflowSummary>> = by_id
            .values()
            .filter(|group| group.len() > 1)
            .map(|group| group.iter().map(|w| WorkflowSummary::from(*w)).collect())
            .collect();

        let duplicate_names: Vec<Vec<WorkflowSummary>> = by_name
            .values()
            .filter(|group| {
                let distinct: HashSet<&WorkflowId> = group.iter().map(|w| &w.id).collect();
                distinct.len() > 1
            })
            .map(|group| group.iter().map(|w| WorkflowSummary::from(*w)).collect())
            .collect();

        let mut unresolved_references = Vec::new();
        let mut seen = HashSet::new();
        for workflow in workflows {
            for target in workflow.referenced_ids(policy) {
                if by_id.contains_key(&target) {
                    continue;
                }
                let edge = UnresolvedReference {
                    from: workflow.id.clone(),
                    to: target,
                };
                if seen.insert(edge.clone()) {
                    unresolved_references.push(edge);
                }
            }
        }

        let valid = duplicate_ids.is_empty()
            && duplicate_names.is_empty()
            && unresolved_references.is_empty();

        Self {
            valid,
            duplicate_ids,
            duplicate_names,
            unresolved_references,
        }
    }

    /// Total number of issues in the report.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.duplicate_ids.len() + self.duplicate_names.len() + self.unresolved_references.len()
    }
}

/// Validation behavior.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Fail on any issue instead of only reporting it.
    pub strict: bool,
    /// Keys that carry call references.
    #[serde(default)]
    pub reference_policy: ReferencePolicy,
}

/// Runs the scan and applies the strict/report decision.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    options: ValidationOptions,
}

impl Validator {
    /// Creates a validator.
    #[must_use]
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    /// Validates a batch.
    ///
    /// # Errors
    ///
    /// In strict mode, returns `ValidationFailed` carrying the full report
    /// when any issue was found.
    pub fn validate(&self, workflows: &[Workflow]) -> Result<ValidationReport, MigrationError> {
        let report = ValidationReport::scan(workflows, &self.options.reference_policy);
        debug!(
            workflows = workflows.len(),
            issues = report.issue_count(),
            "validated workflow batch"
        );

        if !report.valid {
            if self.options.strict {
                return Err(MigrationError::ValidationFailed { report });
            }
            warn!(
                duplicate_ids = report.duplicate_ids.len(),
                duplicate_names = report.duplicate_names.len(),
                unresolved = report.unresolved_references.len(),
                "validation issues found"
            );
        }
        Ok(report)
    }
}
