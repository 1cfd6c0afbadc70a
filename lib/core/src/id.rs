//! Strongly-typed identifiers.
//!
//! Workflow identifiers are assigned by the platform instance that stores the
//! workflow, so they are opaque strings that only mean something relative to
//! one instance. Transfer runs are identified locally with a ULID, giving both
//! uniqueness and temporal ordering in the upload history.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Instance-assigned identifier of a workflow.
///
/// Platform exports carry identifiers either as JSON strings or as JSON
/// numbers; both deserialize into the same value and serialize back as a
/// string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Creates a workflow ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseIdError {
                id_type: "WorkflowId",
                reason: "identifier is empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for WorkflowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for WorkflowId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WorkflowIdVisitor;

        impl Visitor<'_> for WorkflowIdVisitor {
            type Value = WorkflowId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a workflow identifier as a string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(WorkflowId::new(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(WorkflowId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(WorkflowId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(WorkflowId(v.to_string()))
            }
        }

        deserializer.deserialize_any(WorkflowIdVisitor)
    }
}

/// Unique identifier for a single transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferRunId(Ulid);

impl TransferRunId {
    const PREFIX: &'static str = "run";

    /// Creates a new ID with a randomly generated ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates an ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for TransferRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl FromStr for TransferRunId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid_str = s.strip_prefix("run_").unwrap_or(s);
        Ulid::from_str(ulid_str)
            .map(Self)
            .map_err(|e| ParseIdError {
                id_type: "TransferRunId",
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_accepts_string_and_number() {
        let from_string: WorkflowId = serde_json::from_str("\"abc123\"").expect("string id");
        let from_number: WorkflowId = serde_json::from_str("42").expect("numeric id");

        assert_eq!(from_string.as_str(), "abc123");
        assert_eq!(from_number, WorkflowId::new("42"));
    }

    #[test]
    fn workflow_id_serializes_as_string() {
        let id: WorkflowId = serde_json::from_str("7").expect("numeric id");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"7\"");
    }

    #[test]
    fn workflow_id_rejects_blank() {
        let result: Result<WorkflowId, _> = "   ".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "WorkflowId");
    }

    #[test]
    fn workflow_id_orders_lexically() {
        let mut ids = vec![WorkflowId::new("b"), WorkflowId::new("a")];
        ids.sort();
        assert_eq!(ids, vec![WorkflowId::new("a"), WorkflowId::new("b")]);
    }

    #[test]
    fn run_id_display_format() {
        let id = TransferRunId::new();
        assert!(id.to_string().starts_with("run_"));
    }

    #[test]
    fn run_id_parse_with_and_without_prefix() {
        let id = TransferRunId::new();
        let parsed: TransferRunId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);

        let raw: TransferRunId = id.as_ulid().to_string().parse().expect("should parse");
        assert_eq!(id, raw);
    }

    #[test]
    fn run_id_parse_invalid() {
        let result: Result<TransferRunId, _> = "run_not_a_ulid".parse();
        assert_eq!(result.unwrap_err().id_type, "TransferRunId");
    }
}
