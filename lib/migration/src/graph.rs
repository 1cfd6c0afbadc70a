//! Workflow dependency graph using petgraph.
//!
//! Nodes are workflow identifiers and an edge `from -> to` means "`from`
//! calls `to`". The graph owns the identifier and name lookup tables used to
//! reject duplicates, and produces a deterministic processing order where
//! every callee comes before its callers.

use crate::error::GraphError;
use crate::reference::ReferencePolicy;
use crate::validate::UnresolvedReference;
use crate::workflow::Workflow;
use flowshift_core::WorkflowId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Result of a topological sort.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopologicalOrder {
    /// Workflows in dependency order (callees before callers).
    pub order: Vec<WorkflowId>,
    /// Workflows that could not be ordered: members of a cycle and anything
    /// that depends on one. Reported as a single group in insertion order.
    pub cycle: Vec<WorkflowId>,
}

impl TopologicalOrder {
    /// Returns true if the graph had no cycle.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.cycle.is_empty()
    }

    /// Returns the ordered prefix followed by the cycle group.
    #[must_use]
    pub fn processing_sequence(&self) -> Vec<WorkflowId> {
        self.order.iter().chain(self.cycle.iter()).cloned().collect()
    }
}

/// Aggregate counts for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    /// Number of workflows.
    pub total_workflows: usize,
    /// Number of distinct dependency edges.
    pub total_edges: usize,
    /// Mean number of dependencies per workflow.
    pub average_out_degree: f64,
    /// Largest number of dependencies of a single workflow.
    pub max_out_degree: usize,
    /// Workflows that call no other workflow.
    pub independent_workflows: usize,
}

/// A workflow dependency graph.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    /// Node weights are workflow ids; edge weights are unused.
    graph: DiGraph<WorkflowId, ()>,
    /// Map from WorkflowId to petgraph's NodeIndex for O(1) lookup.
    index: HashMap<WorkflowId, NodeIndex>,
    /// Map from workflow name to the workflow that owns it.
    names: HashMap<String, WorkflowId>,
}

impl WorkflowGraph {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a batch, adding one edge per distinct call
    /// reference.
    ///
    /// Self-references impose no ordering and are skipped. References to
    /// workflows outside the batch are returned instead of being added.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate identifiers or names.
    pub fn from_workflows(
        workflows: &[Workflow],
        policy: &ReferencePolicy,
    ) -> Result<(Self, Vec<UnresolvedReference>), GraphError> {
        let mut graph = Self::new();
        for workflow in workflows {
            graph.add_workflow(workflow)?;
        }

        let mut unresolved = Vec::new();
        for workflow in workflows {
            for target in workflow.referenced_ids(policy) {
                if target == workflow.id {
                    continue;
                }
                if graph.contains(&target) {
                    graph.add_dependency(&workflow.id, &target)?;
                } else {
                    unresolved.push(UnresolvedReference {
                        from: workflow.id.clone(),
                        to: target,
                    });
                }
            }
        }

        Ok((graph, unresolved))
    }

    /// Adds a workflow.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentifier` if the id is taken, or `DuplicateName`
    /// if another workflow already uses the name.
    pub fn add_workflow(&mut self, workflow: &Workflow) -> Result<(), GraphError> {
        if self.index.contains_key(&workflow.id) {
            return Err(GraphError::DuplicateIdentifier {
                id: workflow.id.clone(),
            });
        }
        if let Some(existing) = self.names.get(&workflow.name)
            && *existing != workflow.id
        {
            return Err(GraphError::DuplicateName {
                name: workflow.name.clone(),
                existing: existing.clone(),
                incoming: workflow.id.clone(),
            });
        }

        let index = self.graph.add_node(workflow.id.clone());
        self.index.insert(workflow.id.clone(), index);
        self.names.insert(workflow.name.clone(), workflow.id.clone());
        Ok(())
    }

    /// Records that `from` calls `to`. Adding the same pair twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWorkflow` if either end is not in the graph.
    pub fn add_dependency(&mut self, from: &WorkflowId, to: &WorkflowId) -> Result<(), GraphError> {
        let source = self.node_index(from)?;
        let target = self.node_index(to)?;
        self.graph.update_edge(source, target, ());
        Ok(())
    }

    fn node_index(&self, id: &WorkflowId) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownWorkflow { id: id.clone() })
    }

    /// Returns true if the workflow is in the graph.
    #[must_use]
    pub fn contains(&self, id: &WorkflowId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the workflow id registered under a name.
    #[must_use]
    pub fn id_for_name(&self, name: &str) -> Option<&WorkflowId> {
        self.names.get(name)
    }

    /// Returns the number of workflows.
    #[must_use]
    pub fn workflow_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of distinct dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn neighbors(&self, id: &WorkflowId, direction: Direction) -> Vec<WorkflowId> {
        let Some(&index) = self.index.get(id) else {
            return Vec::new();
        };

        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(index, direction).collect();
        found.sort();
        found
            .into_iter()
            .map(|neighbor| self.graph[neighbor].clone())
            .collect()
    }

    /// Returns the workflows `id` calls, in insertion order. Unknown ids
    /// have no dependencies.
    #[must_use]
    pub fn dependencies_of(&self, id: &WorkflowId) -> Vec<WorkflowId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Returns the workflows that call `id`, in insertion order. Unknown ids
    /// have no dependents.
    #[must_use]
    pub fn dependents_of(&self, id: &WorkflowId) -> Vec<WorkflowId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Computes a dependency order with Kahn's algorithm.
    ///
    /// A workflow's in-degree is its number of dependencies. Among workflows
    /// that are ready at the same time the one added first wins, so the
    /// result is deterministic for a fixed input order. Workflows whose
    /// in-degree never reaches zero are returned as one cycle group.
    #[must_use]
    pub fn topological_order(&self) -> TopologicalOrder {
        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Outgoing).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| remaining[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut placed = vec![false; remaining.len()];
        let mut order = Vec::with_capacity(remaining.len());

        while let Some(Reverse(index)) = ready.pop() {
            placed[index.index()] = true;
            order.push(self.graph[index].clone());

            for dependent in self.graph.neighbors_directed(index, Direction::Incoming) {
                let count = &mut remaining[dependent.index()];
                *count -= 1;
                if *count == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        let cycle = self
            .graph
            .node_indices()
            .filter(|idx| !placed[idx.index()])
            .map(|idx| self.graph[idx].clone())
            .collect();

        TopologicalOrder { order, cycle }
    }

    /// Returns aggregate counts for diagnostics.
    #[must_use]
    pub fn statistics(&self) -> GraphStatistics {
        let degrees: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Outgoing).count())
            .collect();

        let total_workflows = degrees.len();
        let average_out_degree = if total_workflows == 0 {
            0.0
        } else {
            self.graph.edge_count() as f64 / total_workflows as f64
        };

        GraphStatistics {
            total_workflows,
            total_edges: self.graph.edge_count(),
            average_out_degree,
            max_out_degree: degrees.iter().copied().max().unwrap_or(0),
            independent_workflows: degrees.iter().filter(|&&d| d == 0).count(),
        }
    }
}
