//! Workflow payload model.
//!
//! A workflow is a named automation consisting of:
//! - An instance-assigned identifier
//! - A list of nodes, each with a type and a free-form parameter tree
//! - A connection map wiring node outputs to node inputs
//!
//! Fields the engine does not interpret (settings, tags, activation state,
//! pin data, ...) are kept in flattened `extra` maps so a payload survives a
//! round trip through the engine unchanged.

use crate::error::StoreError;
use crate::reference::{self, CallReference, ReferencePolicy};
use flowshift_core::WorkflowId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;

/// A single step inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Display name, unique within its workflow.
    pub name: String,
    /// Platform node type (e.g. `n8n-nodes-base.executeWorkflow`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Node parameters. Call references live somewhere in this tree.
    #[serde(default)]
    pub parameters: JsonValue,
    /// Everything else (position, version, credentials, ...).
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Node {
    /// Creates a node with the given name, type and parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, node_type: impl Into<String>, parameters: JsonValue) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            parameters,
            extra: Map::new(),
        }
    }
}

/// A complete workflow definition as exchanged with a platform instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Identifier assigned by the instance that holds this copy.
    pub id: WorkflowId,
    /// Human-readable name; unique within a migration batch.
    pub name: String,
    /// The workflow's nodes.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Connections between nodes, keyed by source node name.
    #[serde(default)]
    pub connections: JsonValue,
    /// Fields the engine passes through untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Workflow {
    /// Creates an empty workflow with the given identifier and name.
    #[must_use]
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            connections: JsonValue::Object(Map::new()),
            extra: Map::new(),
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a node that invokes another workflow by identifier.
    #[must_use]
    pub fn with_call_to(self, node_name: impl Into<String>, target: &WorkflowId) -> Self {
        self.with_node(Node::new(
            node_name,
            "n8n-nodes-base.executeWorkflow",
            serde_json::json!({ "workflowId": target.as_str() }),
        ))
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns every call reference embedded in the node parameters.
    #[must_use]
    pub fn call_references(&self, policy: &ReferencePolicy) -> Vec<CallReference> {
        let mut found = Vec::new();
        for node in &self.nodes {
            reference::collect(&node.name, &node.parameters, policy, &mut found);
        }
        found
    }

    /// Returns the distinct workflow identifiers this workflow calls, in
    /// order of first appearance.
    #[must_use]
    pub fn referenced_ids(&self, policy: &ReferencePolicy) -> Vec<WorkflowId> {
        let mut ids: Vec<WorkflowId> = Vec::new();
        for found in self.call_references(policy) {
            if !ids.contains(&found.target) {
                ids.push(found.target);
            }
        }
        ids
    }

    /// Loads a batch of workflows from a JSON export file.
    ///
    /// The file may hold either an array of workflows or a single workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_batch(path: &Path) -> flowshift_core::Result<Vec<Self>, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

        let value: JsonValue = serde_json::from_str(&raw).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            line: Some(e.line()),
            details: e.to_string(),
        })?;

        let batch = match value {
            JsonValue::Array(_) => serde_json::from_value(value),
            single => serde_json::from_value(single).map(|workflow: Self| vec![workflow]),
        };

        Ok(batch.map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            line: None,
            details: e.to_string(),
        })?)
    }
}
