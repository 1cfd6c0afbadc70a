//! Reference remapping.
//!
//! Rewrites every call reference of a workflow from source identifiers to
//! destination identifiers using the [`IdMapping`]. The input is never
//! modified; a remapped working copy is returned.

use crate::error::RemapError;
use crate::mapping::IdMapping;
use crate::reference::{self, ReferencePolicy};
use crate::workflow::Workflow;
use flowshift_core::WorkflowId;

/// Result of remapping one workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapOutcome {
    /// The remapped working copy.
    pub workflow: Workflow,
    /// `(old, new)` pairs that were rewritten.
    pub rewritten: Vec<(WorkflowId, WorkflowId)>,
    /// References left unchanged because the mapping has no entry for them.
    pub unresolved: Vec<WorkflowId>,
}

impl RemapOutcome {
    /// Returns true if any reference was rewritten.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.rewritten.is_empty()
    }
}

/// Rewrites call references using an ID mapping.
#[derive(Debug, Clone)]
pub struct Remapper<'a> {
    mapping: &'a IdMapping,
    policy: ReferencePolicy,
    strict: bool,
}

impl<'a> Remapper<'a> {
    /// Creates a lenient remapper with the default reference policy.
    #[must_use]
    pub fn new(mapping: &'a IdMapping) -> Self {
        Self {
            mapping,
            policy: ReferencePolicy::default(),
            strict: false,
        }
    }

    /// Sets the reference policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fails on the first unresolved reference instead of recording it.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Remaps one workflow.
    ///
    /// Every reference without a mapping entry is left unchanged and listed
    /// in [`RemapOutcome::unresolved`], even when its value happens to equal
    /// a destination identifier. Remapping an already-remapped payload
    /// therefore leaves it unchanged but reports its references.
    ///
    /// # Errors
    ///
    /// In strict mode, returns `UnresolvedReference` for the first reference
    /// with no mapping entry.
    pub fn remap(&self, workflow: &Workflow) -> Result<RemapOutcome, RemapError> {
        let mut copy = workflow.clone();
        let mut rewritten = Vec::new();
        let mut unresolved = Vec::new();
        let mut first_unresolved: Option<(String, WorkflowId)> = None;

        for node in &mut copy.nodes {
            let node_name = node.name.clone();
            reference::visit_mut(&mut node.parameters, &self.policy, &mut |old_id| {
                if let Some(new_id) = self.mapping.resolve(old_id) {
                    if new_id != old_id {
                        rewritten.push((old_id.clone(), new_id.clone()));
                        return Some(new_id.clone());
                    }
                    return None;
                }
                if first_unresolved.is_none() {
                    first_unresolved = Some((node_name.clone(), old_id.clone()));
                }
                if !unresolved.contains(old_id) {
                    unresolved.push(old_id.clone());
                }
                None
            });
        }

        if self.strict
            && let Some((node, reference)) = first_unresolved
        {
            return Err(RemapError::UnresolvedReference {
                workflow: workflow.name.clone(),
                node,
                reference,
            });
        }

        Ok(RemapOutcome {
            workflow: copy,
            rewritten,
            unresolved,
        })
    }
}
