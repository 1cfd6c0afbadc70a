//! Post-migration verification.
//!
//! Compares the source workflows with a snapshot of the destination and
//! produces one result per check:
//!
//! 1. **Workflow count**: the snapshot holds as many workflows as the source
//! 2. **Mapping coverage**: every source identifier has a mapping entry
//! 3. **Reference integrity**: every call reference in the snapshot points at
//!    a workflow that exists at the destination
//! 4. **Node counts**: each destination workflow has as many nodes as its
//!    source

use crate::mapping::IdMapping;
use crate::reference::ReferencePolicy;
use crate::workflow::Workflow;
use flowshift_core::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The four verification checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    WorkflowCount,
    MappingCoverage,
    ReferenceIntegrity,
    NodeCounts,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowCount => write!(f, "workflow count"),
            Self::MappingCoverage => write!(f, "mapping coverage"),
            Self::ReferenceIntegrity => write!(f, "reference integrity"),
            Self::NodeCounts => write!(f, "node counts"),
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub passed: bool,
    /// Human-readable summary.
    pub details: String,
    /// Names of the workflows that failed the check.
    pub affected: Vec<String>,
}

impl CheckResult {
    fn new(kind: CheckKind, details: String, affected: Vec<String>, passed: bool) -> Self {
        Self {
            kind,
            passed,
            details,
            affected,
        }
    }
}

/// Result of verifying a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True only when every check passed.
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    /// Returns the checks that failed.
    pub fn failing_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|check| !check.passed)
    }

    /// Returns the result of one check.
    #[must_use]
    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|check| check.kind == kind)
    }

    /// Returns the names of every workflow that failed any check.
    #[must_use]
    pub fn affected_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.failing_checks().flat_map(|check| check.affected.iter()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Verifies a destination snapshot against the source batch.
#[derive(Debug, Clone, Default)]
pub struct MigrationVerifier {
    policy: ReferencePolicy,
    known_ids: HashSet<WorkflowId>,
}

impl MigrationVerifier {
    /// Creates a verifier with the default reference policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reference policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds destination identifiers that exist outside the snapshot and are
    /// valid reference targets.
    #[must_use]
    pub fn with_known_ids(mut self, ids: impl IntoIterator<Item = WorkflowId>) -> Self {
        self.known_ids.extend(ids);
        self
    }

    /// Runs all four checks.
    #[must_use]
    pub fn verify(
        &self,
        original: &[Workflow],
        mapping: &IdMapping,
        destination: &[Workflow],
    ) -> VerificationReport {
        let checks = vec![
            Self::check_count(original, destination),
            Self::check_coverage(original, mapping),
            self.check_references(destination),
            Self::check_node_counts(original, mapping, destination),
        ];
        let passed = checks.iter().all(|check| check.passed);
        VerificationReport { passed, checks }
    }

    fn check_count(original: &[Workflow], destination: &[Workflow]) -> CheckResult {
        let expected = original.len();
        let actual = destination.len();

        let affected = if expected == actual {
            Vec::new()
        } else {
            let present: HashSet<&str> = destination.iter().map(|w| w.name.as_str()).collect();
            original
                .iter()
                .filter(|w| !present.contains(w.name.as_str()))
                .map(|w| w.name.clone())
                .collect()
        };

        CheckResult::new(
            CheckKind::WorkflowCount,
            format!("expected {expected} workflow(s), found {actual}"),
            affected,
            expected == actual,
        )
    }

    fn check_coverage(original: &[Workflow], mapping: &IdMapping) -> CheckResult {
        let affected: Vec<String> = original
            .iter()
            .filter(|w| mapping.resolve(&w.id).is_none())
            .map(|w| w.name.clone())
            .collect();

        CheckResult::new(
            CheckKind::MappingCoverage,
            format!(
                "{} of {} workflow(s) have a mapping entry",
                original.len() - affected.len(),
                original.len()
            ),
            affected.clone(),
            affected.is_empty(),
        )
    }

    fn check_references(&self, destination: &[Workflow]) -> CheckResult {
        let existing: HashSet<&WorkflowId> = destination
            .iter()
            .map(|w| &w.id)
            .chain(self.known_ids.iter())
            .collect();

        let mut dangling = 0;
        let mut affected = Vec::new();
        for workflow in destination {
            let missing = workflow
                .referenced_ids(&self.policy)
                .into_iter()
                .filter(|target| !existing.contains(target))
                .count();
            if missing > 0 {
                dangling += missing;
                affected.push(workflow.name.clone());
            }
        }

        CheckResult::new(
            CheckKind::ReferenceIntegrity,
            format!("{dangling} dangling call reference(s)"),
            affected,
            dangling == 0,
        )
    }

    fn check_node_counts(
        original: &[Workflow],
        mapping: &IdMapping,
        destination: &[Workflow],
    ) -> CheckResult {
        let by_id: HashMap<&WorkflowId, &Workflow> =
            destination.iter().map(|w| (&w.id, w)).collect();

        let mut affected = Vec::new();
        let mut compared = 0;
        for source in original {
            let Some(copy) = mapping.resolve(&source.id).and_then(|new_id| by_id.get(new_id))
            else {
                continue;
            };
            compared += 1;
            if copy.node_count() != source.node_count() {
                affected.push(source.name.clone());
            }
        }

        CheckResult::new(
            CheckKind::NodeCounts,
            format!(
                "{} of {compared} workflow(s) have mismatched node counts",
                affected.len()
            ),
            affected.clone(),
            affected.is_empty(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Node;
    use serde_json::json;

    fn id(raw: &str) -> WorkflowId {
        WorkflowId::new(raw)
    }

    fn trigger() -> Node {
        Node::new("Start", "n8n-nodes-base.manualTrigger", json!({}))
    }

    fn source() -> Vec<Workflow> {
        vec![
            Workflow::new("1", "leaf").with_node(trigger()),
            Workflow::new("2", "caller")
                .with_node(trigger())
                .with_call_to("Call leaf", &id("1")),
        ]
    }

    fn mapping() -> IdMapping {
        let mut mapping = IdMapping::new();
        mapping.add(id("1"), id("a"), "leaf");
        mapping.add(id("2"), id("b"), "caller");
        mapping
    }

    fn destination() -> Vec<Workflow> {
        vec![
            Workflow::new("a", "leaf").with_node(trigger()),
            Workflow::new("b", "caller")
                .with_node(trigger())
                .with_call_to("Call leaf", &id("a")),
        ]
    }

    #[test]
    fn consistent_migration_passes_all_checks() {
        let report = MigrationVerifier::new().verify(&source(), &mapping(), &destination());
        assert!(report.passed);
        assert_eq!(report.checks.len(), 4);
        assert_eq!(report.failing_checks().count(), 0);
    }

    #[test]
    fn missing_destination_workflow_fails_count() {
        let mut destination = destination();
        destination.remove(0);

        let report = MigrationVerifier::new().verify(&source(), &mapping(), &destination);
        assert!(!report.passed);
        let count = report.check(CheckKind::WorkflowCount).expect("count check");
        assert!(!count.passed);
        assert_eq!(count.affected, vec!["leaf".to_string()]);
    }

    #[test]
    fn unmapped_source_fails_coverage() {
        let mut mapping = IdMapping::new();
        mapping.add(id("1"), id("a"), "leaf");

        let report = MigrationVerifier::new().verify(&source(), &mapping, &destination());
        let coverage = report.check(CheckKind::MappingCoverage).expect("coverage");
        assert!(!coverage.passed);
        assert_eq!(coverage.affected, vec!["caller".to_string()]);
    }

    #[test]
    fn stale_reference_fails_integrity() {
        let mut destination = destination();
        destination[1] = Workflow::new("b", "caller")
            .with_node(trigger())
            .with_call_to("Call leaf", &id("1"));

        let report = MigrationVerifier::new().verify(&source(), &mapping(), &destination);
        let integrity = report.check(CheckKind::ReferenceIntegrity).expect("integrity");
        assert!(!integrity.passed);
        assert_eq!(report.affected_workflows(), vec!["caller".to_string()]);
    }

    #[test]
    fn known_ids_satisfy_references() {
        let destination = vec![Workflow::new("b", "caller").with_call_to("Call", &id("pre-existing"))];
        let report = MigrationVerifier::new()
            .with_known_ids([id("pre-existing")])
            .verify(&[], &IdMapping::new(), &destination);
        assert!(report.check(CheckKind::ReferenceIntegrity).expect("integrity").passed);
    }

    #[test]
    fn truncated_workflow_fails_node_counts() {
        let mut destination = destination();
        destination[0].nodes.clear();

        let report = MigrationVerifier::new().verify(&source(), &mapping(), &destination);
        let nodes = report.check(CheckKind::NodeCounts).expect("node counts");
        assert!(!nodes.passed);
        assert_eq!(nodes.affected, vec!["leaf".to_string()]);
        assert!(report.check(CheckKind::WorkflowCount).expect("count").passed);
    }
}
