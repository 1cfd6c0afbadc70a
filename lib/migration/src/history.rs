//! Append-only upload history.
//!
//! One record is written per attempted upload. The log is persisted as JSON
//! Lines so that an interrupted run can be resumed by loading the file and
//! appending to it. There is no mutation or deletion API.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use flowshift_core::{TransferRunId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Which upload pass a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// First pass: the workflow is created and receives its new identifier.
    Create,
    /// Second pass: the remapped payload overwrites the created workflow.
    Update,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Outcome of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Success,
    Failed,
    Skipped,
}

/// A single upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Run that made the attempt.
    pub run_id: TransferRunId,
    /// Workflow name.
    pub name: String,
    /// Source identifier.
    pub old_id: WorkflowId,
    /// Destination identifier, when known.
    pub new_id: Option<WorkflowId>,
    /// Upload pass.
    pub phase: UploadPhase,
    /// Outcome.
    pub status: UploadStatus,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Failure or skip reason.
    pub error_message: Option<String>,
}

impl UploadRecord {
    /// Creates a successful record.
    #[must_use]
    pub fn success(
        run_id: TransferRunId,
        phase: UploadPhase,
        name: impl Into<String>,
        old_id: WorkflowId,
        new_id: WorkflowId,
    ) -> Self {
        Self {
            run_id,
            name: name.into(),
            old_id,
            new_id: Some(new_id),
            phase,
            status: UploadStatus::Success,
            timestamp: Utc::now(),
            error_message: None,
        }
    }

    /// Creates a failed record.
    #[must_use]
    pub fn failed(
        run_id: TransferRunId,
        phase: UploadPhase,
        name: impl Into<String>,
        old_id: WorkflowId,
        error: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            name: name.into(),
            old_id,
            new_id: None,
            phase,
            status: UploadStatus::Failed,
            timestamp: Utc::now(),
            error_message: Some(error.into()),
        }
    }

    /// Creates a skipped record.
    #[must_use]
    pub fn skipped(
        run_id: TransferRunId,
        phase: UploadPhase,
        name: impl Into<String>,
        old_id: WorkflowId,
        new_id: Option<WorkflowId>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            name: name.into(),
            old_id,
            new_id,
            phase,
            status: UploadStatus::Skipped,
            timestamp: Utc::now(),
            error_message: Some(reason.into()),
        }
    }
}

/// The upload history log.
#[derive(Debug, Clone, Default)]
pub struct UploadHistory {
    records: Vec<UploadRecord>,
    /// Number of leading records already on disk.
    flushed: usize,
}

impl UploadHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn add(&mut self, record: UploadRecord) {
        self.records.push(record);
    }

    /// Returns the most recent record for a workflow name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&UploadRecord> {
        self.records.iter().rev().find(|record| record.name == name)
    }

    /// Returns the most recent successful creation for a workflow name.
    #[must_use]
    pub fn find_created(&self, name: &str) -> Option<&UploadRecord> {
        self.records.iter().rev().find(|record| {
            record.name == name
                && record.phase == UploadPhase::Create
                && record.status == UploadStatus::Success
                && record.new_id.is_some()
        })
    }

    /// Returns all records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    /// Returns the records written by one run.
    pub fn for_run(&self, run_id: TransferRunId) -> impl Iterator<Item = &UploadRecord> {
        self.records.iter().filter(move |record| record.run_id == run_id)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends every record not yet written to `path`, one JSON object per
    /// line. Records obtained from [`UploadHistory::load`] count as written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn persist(&mut self, path: &Path) -> flowshift_core::Result<(), StoreError> {
        let pending = &self.records[self.flushed..];
        if pending.is_empty() {
            return Ok(());
        }

        let io_error = |e: std::io::Error| StoreError::Io {
            path: path.display().to_string(),
            details: e.to_string(),
        };

        let mut buffer = Vec::new();
        for record in pending {
            serde_json::to_writer(&mut buffer, record).map_err(|e| StoreError::Parse {
                path: path.display().to_string(),
                line: None,
                details: e.to_string(),
            })?;
            buffer.push(b'\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;
        file.write_all(&buffer).map_err(io_error)?;
        file.flush().map_err(io_error)?;

        debug!(path = %path.display(), appended = pending.len(), "persisted upload history");
        self.flushed = self.records.len();
        Ok(())
    }

    /// Reads a log from `path`. A missing file yields an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is malformed.
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

        let mut records = Vec::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|e| StoreError::Parse {
                path: path.display().to_string(),
                line: Some(number + 1),
                details: e.to_string(),
            })?;
            records.push(record);
        }

        let flushed = records.len();
        Ok(Self { records, flushed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> WorkflowId {
        WorkflowId::new(raw)
    }

    #[test]
    fn find_by_name_returns_most_recent() {
        let run = TransferRunId::new();
        let mut history = UploadHistory::new();
        history.add(UploadRecord::failed(run, UploadPhase::Create, "a", id("1"), "boom"));
        history.add(UploadRecord::success(run, UploadPhase::Create, "a", id("1"), id("x")));
        history.add(UploadRecord::success(run, UploadPhase::Create, "b", id("2"), id("y")));

        let latest = history.find_by_name("a").expect("record for a");
        assert_eq!(latest.status, UploadStatus::Success);
        assert_eq!(latest.new_id, Some(id("x")));
        assert!(history.find_by_name("missing").is_none());
    }

    #[test]
    fn find_created_ignores_updates_and_failures() {
        let run = TransferRunId::new();
        let mut history = UploadHistory::new();
        history.add(UploadRecord::success(run, UploadPhase::Create, "a", id("1"), id("x")));
        history.add(UploadRecord::failed(run, UploadPhase::Update, "a", id("1"), "timeout"));

        assert_eq!(
            history.find_by_name("a").map(|r| r.status),
            Some(UploadStatus::Failed)
        );
        assert_eq!(
            history.find_created("a").and_then(|r| r.new_id.clone()),
            Some(id("x"))
        );
    }

    #[test]
    fn persist_appends_only_new_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_history.jsonl");
        let run = TransferRunId::new();

        let mut history = UploadHistory::new();
        history.add(UploadRecord::success(run, UploadPhase::Create, "a", id("1"), id("x")));
        history.persist(&path).expect("first persist");
        history.persist(&path).expect("no-op persist");

        let mut resumed = UploadHistory::load(&path).expect("load");
        assert_eq!(resumed.len(), 1);
        resumed.add(UploadRecord::skipped(
            TransferRunId::new(),
            UploadPhase::Create,
            "a",
            id("1"),
            Some(id("x")),
            "already migrated",
        ));
        resumed.persist(&path).expect("append");

        let reloaded = UploadHistory::load(&path).expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.records()[0], history.records()[0]);
        assert_eq!(reloaded.records()[1].status, UploadStatus::Skipped);

        let lines = std::fs::read_to_string(&path).expect("read").lines().count();
        assert_eq!(lines, 2);
    }

    #[test]
    fn for_run_filters_by_run() {
        let first = TransferRunId::new();
        let second = TransferRunId::new();
        let mut history = UploadHistory::new();
        history.add(UploadRecord::success(first, UploadPhase::Create, "a", id("1"), id("x")));
        history.add(UploadRecord::success(second, UploadPhase::Create, "b", id("2"), id("y")));

        let names: Vec<&str> = history.for_run(second).map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = UploadHistory::load(&dir.path().join("absent.jsonl")).expect("load");
        assert!(history.is_empty());
    }

    #[test]
    fn load_reports_malformed_line_number() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_history.jsonl");
        let run = TransferRunId::new();
        let good = serde_json::to_string(&UploadRecord::success(
            run,
            UploadPhase::Create,
            "a",
            id("1"),
            id("x"),
        ))
        .expect("serialize");
        std::fs::write(&path, format!("{good}\n\nnot json\n")).expect("write");

        let err = UploadHistory::load(&path).unwrap_err();
        match err.current_context() {
            StoreError::Parse { line, .. } => assert_eq!(*line, Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
