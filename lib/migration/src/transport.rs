//! Workflow transport abstraction.
//!
//! The engine reaches platform instances only through [`WorkflowTransport`].
//! Timeouts and retries belong to the implementation; the engine treats
//! every call as either a success or a terminal failure to record.
//!
//! [`InMemoryTransport`] stands in for a platform instance in tests and
//! simulations.

use crate::workflow::Workflow;
use async_trait::async_trait;
use flowshift_core::WorkflowId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Filter applied when listing workflows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFilter {
    /// Only workflows whose name contains this text.
    pub name_contains: Option<String>,
    /// Only active (or only inactive) workflows.
    pub active: Option<bool>,
}

impl WorkflowFilter {
    /// Returns true if the workflow passes the filter.
    #[must_use]
    pub fn matches(&self, workflow: &Workflow) -> bool {
        if let Some(needle) = &self.name_contains
            && !workflow.name.contains(needle.as_str())
        {
            return false;
        }
        if let Some(active) = self.active {
            let is_active = workflow
                .extra
                .get("active")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false);
            if is_active != active {
                return false;
            }
        }
        true
    }
}

/// Trait for reaching a workflow-automation platform instance.
#[async_trait]
pub trait WorkflowTransport: Send + Sync {
    /// Lists workflows matching the filter.
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, TransportError>;

    /// Creates a workflow and returns it with its instance-assigned id.
    async fn create(&self, workflow: &Workflow) -> Result<Workflow, TransportError>;

    /// Overwrites the workflow stored under `id`.
    async fn update(&self, id: &WorkflowId, workflow: &Workflow)
    -> Result<Workflow, TransportError>;

    /// Fetches one workflow.
    async fn get(&self, id: &WorkflowId) -> Result<Workflow, TransportError>;
}

#[async_trait]
impl<T: WorkflowTransport + ?Sized> WorkflowTransport for Arc<T> {
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, TransportError> {
        (**self).list(filter).await
    }

    async fn create(&self, workflow: &Workflow) -> Result<Workflow, TransportError> {
        (**self).create(workflow).await
    }

    async fn update(
        &self,
        id: &WorkflowId,
        workflow: &Workflow,
    ) -> Result<Workflow, TransportError> {
        (**self).update(id, workflow).await
    }

    async fn get(&self, id: &WorkflowId) -> Result<Workflow, TransportError> {
        (**self).get(id).await
    }
}

/// Errors from transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The workflow does not exist.
    NotFound { id: WorkflowId },
    /// The instance answered with a non-success status.
    Status { status: u16, body: String },
    /// The request could not be completed (connection, timeout, ...).
    Request { message: String },
    /// The response could not be decoded.
    Decode { message: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "workflow not found: {id}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Request { message } => write!(f, "request failed: {message}"),
            Self::Decode { message } => write!(f, "invalid response: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Default)]
struct InMemoryState {
    workflows: Vec<Workflow>,
    next_id: usize,
}

/// An in-memory platform instance.
///
/// Identifiers are assigned as `dst-1`, `dst-2`, ... in creation order.
/// Individual workflows can be configured to fail on create or update, and
/// an artificial latency makes concurrent calls overlap.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: Mutex<InMemoryState>,
    fail_create: HashSet<String>,
    fail_update: HashSet<String>,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    get_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryTransport {
    /// Creates an empty instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the instance with existing workflows, keeping their ids.
    #[must_use]
    pub fn with_workflows(self, workflows: impl IntoIterator<Item = Workflow>) -> Self {
        self.lock().workflows.extend(workflows);
        self
    }

    /// Makes `create` fail for the named workflow.
    #[must_use]
    pub fn failing_create(mut self, name: impl Into<String>) -> Self {
        self.fail_create.insert(name.into());
        self
    }

    /// Makes `update` fail for the named workflow.
    #[must_use]
    pub fn failing_update(mut self, name: impl Into<String>) -> Self {
        self.fail_update.insert(name.into());
        self
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns a copy of every stored workflow.
    #[must_use]
    pub fn workflows(&self) -> Vec<Workflow> {
        self.lock().workflows.clone()
    }

    /// Returns the stored workflow with the given name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Workflow> {
        self.lock()
            .workflows
            .iter()
            .find(|workflow| workflow.name == name)
            .cloned()
    }

    /// Number of `list` calls.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `create` calls.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `update` calls.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Number of `get` calls.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Largest number of calls that were in progress at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        // A poisoned lock only means another test thread panicked mid-call;
        // the data itself is still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlightGuard {
            counter: &self.in_flight,
        }
    }
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowTransport for InMemoryTransport {
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        Ok(self
            .lock()
            .workflows
            .iter()
            .filter(|workflow| filter.matches(workflow))
            .cloned()
            .collect())
    }

    async fn create(&self, workflow: &Workflow) -> Result<Workflow, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        if self.fail_create.contains(&workflow.name) {
            return Err(TransportError::Status {
                status: 500,
                body: format!("simulated create failure for '{}'", workflow.name),
            });
        }

        let mut state = self.lock();
        state.next_id += 1;
        let mut created = workflow.clone();
        created.id = WorkflowId::new(format!("dst-{}", state.next_id));
        state.workflows.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: &WorkflowId,
        workflow: &Workflow,
    ) -> Result<Workflow, TransportError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        if self.fail_update.contains(&workflow.name) {
            return Err(TransportError::Status {
                status: 500,
                body: format!("simulated update failure for '{}'", workflow.name),
            });
        }

        let mut state = self.lock();
        let slot = state
            .workflows
            .iter_mut()
            .find(|existing| existing.id == *id)
            .ok_or_else(|| TransportError::NotFound { id: id.clone() })?;
        let mut updated = workflow.clone();
        updated.id = id.clone();
        *slot = updated.clone();
        Ok(updated)
    }

    async fn get(&self, id: &WorkflowId) -> Result<Workflow, TransportError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        self.lock()
            .workflows
            .iter()
            .find(|workflow| workflow.id == *id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound { id: id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_new_ids() {
        let transport = InMemoryTransport::new();
        let first = transport
            .create(&Workflow::new("1", "a"))
            .await
            .expect("create a");
        let second = transport
            .create(&Workflow::new("2", "b"))
            .await
            .expect("create b");

        assert_eq!(first.id, WorkflowId::new("dst-1"));
        assert_eq!(second.id, WorkflowId::new("dst-2"));
        assert_eq!(transport.create_calls(), 2);
    }

    #[tokio::test]
    async fn update_overwrites_and_keeps_id() {
        let transport = InMemoryTransport::new();
        let created = transport
            .create(&Workflow::new("1", "a"))
            .await
            .expect("create");

        let mut changed = Workflow::new("ignored", "a");
        changed.extra.insert("active".to_string(), serde_json::json!(true));
        let updated = transport
            .update(&created.id, &changed)
            .await
            .expect("update");

        assert_eq!(updated.id, created.id);
        let stored = transport.get(&created.id).await.expect("get");
        assert_eq!(stored.extra["active"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let transport = InMemoryTransport::new();
        let id = WorkflowId::new("nope");

        assert_eq!(
            transport.get(&id).await.unwrap_err(),
            TransportError::NotFound { id: id.clone() }
        );
        assert!(matches!(
            transport.update(&id, &Workflow::new("x", "x")).await,
            Err(TransportError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn configured_failures_are_reported() {
        let transport = InMemoryTransport::new().failing_create("bad");
        let err = transport.create(&Workflow::new("1", "bad")).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert!(transport.workflows().is_empty());
    }

    #[tokio::test]
    async fn list_applies_filter() {
        let mut active = Workflow::new("1", "Billing sync");
        active.extra.insert("active".to_string(), serde_json::json!(true));
        let transport =
            InMemoryTransport::new().with_workflows([active, Workflow::new("2", "Billing export")]);

        let only_active = transport
            .list(&WorkflowFilter {
                active: Some(true),
                ..Default::default()
            })
            .await
            .expect("list");
        assert_eq!(only_active.len(), 1);

        let by_name = transport
            .list(&WorkflowFilter {
                name_contains: Some("export".to_string()),
                ..Default::default()
            })
            .await
            .expect("list");
        assert_eq!(by_name[0].name, "Billing export");
    }

    #[tokio::test]
    async fn arc_forwards_to_inner_transport() {
        let transport = Arc::new(InMemoryTransport::new());
        let shared = Arc::clone(&transport);
        shared.create(&Workflow::new("1", "a")).await.expect("create");
        assert_eq!(transport.create_calls(), 1);
    }
}
