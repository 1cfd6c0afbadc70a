//! Old-identifier to new-identifier mapping.
//!
//! Entries are created as workflows are created at the destination and are
//! consumed by the remapper and the verifier. The table is persisted as a
//! flat JSON object keyed by old identifier:
//!
//! ```json
//! { "12": { "newId": "aB3dE", "name": "Nightly report" } }
//! ```

use crate::error::StoreError;
use flowshift_core::WorkflowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Destination identity of one migrated workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    /// Identifier assigned by the destination.
    pub new_id: WorkflowId,
    /// Workflow name at the time of creation.
    pub name: String,
}

/// The ID mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMapping {
    entries: BTreeMap<WorkflowId, MappingEntry>,
}

impl IdMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `old_id` was created as `new_id`.
    ///
    /// An existing entry for `old_id` is overwritten.
    pub fn add(&mut self, old_id: WorkflowId, new_id: WorkflowId, name: impl Into<String>) {
        let name = name.into();
        if let Some(previous) = self.entries.get(&old_id)
            && previous.new_id != new_id
        {
            debug!(%old_id, previous = %previous.new_id, %new_id, "overwriting id mapping");
        }
        self.entries.insert(old_id, MappingEntry { new_id, name });
    }

    /// Returns the new identifier for `old_id`, or `None` when unmapped.
    #[must_use]
    pub fn resolve(&self, old_id: &WorkflowId) -> Option<&WorkflowId> {
        self.entries.get(old_id).map(|entry| &entry.new_id)
    }

    /// Returns the full entry for `old_id`.
    #[must_use]
    pub fn entry(&self, old_id: &WorkflowId) -> Option<&MappingEntry> {
        self.entries.get(old_id)
    }

    /// Iterates over `(old_id, entry)` pairs ordered by old identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&WorkflowId, &MappingEntry)> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the table to `path`, replacing any previous contents.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self, path: &Path) -> flowshift_core::Result<(), StoreError> {
        let io_error = |e: std::io::Error| StoreError::Io {
            path: path.display().to_string(),
            details: e.to_string(),
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            line: None,
            details: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_error)?;
        std::fs::rename(&tmp, path).map_err(io_error)?;

        debug!(path = %path.display(), entries = self.len(), "persisted id mapping");
        Ok(())
    }

    /// Reads a table from `path`. A missing file yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> flowshift_core::Result<Self, StoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    details: e.to_string(),
                }
                .into());
            }
        };

        let mapping: Self = serde_json::from_str(&raw).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            line: Some(e.line()),
            details: e.to_string(),
        })?;

        debug!(path = %path.display(), entries = mapping.len(), "loaded id mapping");
        Ok(mapping)
    }
}
