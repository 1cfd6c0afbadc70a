//! Call-reference traversal over node parameters.
//!
//! A workflow invokes another workflow through a parameter whose key is one
//! of the policy's reference keys (`workflowId` by default). The parameter
//! can sit at any depth of the parameter tree and its value takes one of
//! three shapes:
//!
//! - a plain string: `"workflowId": "abc"`
//! - a number: `"workflowId": 42`
//! - a resource locator: `"workflowId": { "__rl": true, "value": "abc", "mode": "list" }`
//!
//! Strings starting with `=` are runtime expressions and never count as
//! references. Collection and rewriting share [`visit_mut`] so every consumer
//! sees the same set of references.

use flowshift_core::WorkflowId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default parameter key holding a call reference.
pub const DEFAULT_REFERENCE_KEY: &str = "workflowId";

/// Which parameter keys carry call references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePolicy {
    /// Parameter keys whose values are workflow identifiers.
    pub keys: Vec<String>,
}

impl ReferencePolicy {
    /// Creates a policy matching the given keys.
    #[must_use]
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

impl Default for ReferencePolicy {
    fn default() -> Self {
        Self::new([DEFAULT_REFERENCE_KEY])
    }
}

/// A call reference found inside a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReference {
    /// Name of the node holding the reference.
    pub node: String,
    /// The referenced workflow.
    pub target: WorkflowId,
}

/// Reads the identifier out of a reference value, if it holds one.
fn reference_id(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() && !s.starts_with('=') => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Object(map) => map.get("value").and_then(|inner| match inner {
            JsonValue::Object(_) => None,
            other => reference_id(other),
        }),
        _ => None,
    }
}

/// Overwrites the identifier inside a reference value.
fn replace_id(value: &mut JsonValue, new_id: &WorkflowId) {
    match value {
        JsonValue::Object(map) => {
            if let Some(inner) = map.get_mut("value") {
                *inner = JsonValue::String(new_id.to_string());
            }
        }
        other => *other = JsonValue::String(new_id.to_string()),
    }
}

/// Walks a parameter tree and calls `visit` for every reference value.
///
/// When `visit` returns a new identifier the reference is rewritten in place.
/// Values under a reference key that do not hold an identifier (nested
/// objects without a `value`, expressions) are descended into like any other
/// subtree.
pub fn visit_mut<F>(value: &mut JsonValue, policy: &ReferencePolicy, visit: &mut F)
where
    F: FnMut(&WorkflowId) -> Option<WorkflowId>,
{
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map.iter_mut() {
                if policy.matches(key)
                    && let Some(id) = reference_id(child)
                {
                    if let Some(new_id) = visit(&WorkflowId::new(id)) {
                        replace_id(child, &new_id);
                    }
                    continue;
                }
                visit_mut(child, policy, visit);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                visit_mut(item, policy, visit);
            }
        }
        _ => {}
    }
}

/// Collects every reference in `parameters` into `found`.
pub fn collect(
    node: &str,
    parameters: &JsonValue,
    policy: &ReferencePolicy,
    found: &mut Vec<CallReference>,
) {
    // Collection reuses the rewriting walk on a scratch copy so the two can
    // never diverge.
    let mut scratch = parameters.clone();
    visit_mut(&mut scratch, policy, &mut |id| {
        found.push(CallReference {
            node: node.to_string(),
            target: id.clone(),
        });
        None
    });
}
