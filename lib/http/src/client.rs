//! [`WorkflowTransport`] over the platform's public REST API.

use crate::config::{HttpTransportConfig, RetryConfig};
use async_trait::async_trait;
use flowshift_core::WorkflowId;
use flowshift_migration::{Node, TransportError, Workflow, WorkflowFilter, WorkflowTransport};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, instrument, warn};

const WORKFLOWS_PATH: &str = "/api/v1/workflows";

/// One page of a workflow listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowPage {
    #[serde(default)]
    data: Vec<Workflow>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// The writable subset of a workflow. The instance rejects read-only
/// fields such as `id`, `active` or `tags` on create and update.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowPayload<'a> {
    name: &'a str,
    nodes: &'a [Node],
    connections: &'a JsonValue,
    settings: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    static_data: Option<&'a JsonValue>,
}

impl<'a> From<&'a Workflow> for WorkflowPayload<'a> {
    fn from(workflow: &'a Workflow) -> Self {
        let settings = workflow
            .extra
            .get("settings")
            .filter(|value| value.is_object())
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(Map::new()));
        let static_data = workflow
            .extra
            .get("staticData")
            .filter(|value| !value.is_null());

        Self {
            name: &workflow.name,
            nodes: &workflow.nodes,
            connections: &workflow.connections,
            settings,
            static_data,
        }
    }
}

/// HTTP transport for one platform instance.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
    workflows_url: String,
}

impl HttpTransport {
    /// Creates a transport from its config.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::Request {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let workflows_url = format!("{}{WORKFLOWS_PATH}", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            workflows_url,
        })
    }

    /// Returns the transport's config.
    #[must_use]
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn retry(&self) -> &RetryConfig {
        &self.config.retry
    }

    fn workflow_url(&self, id: &WorkflowId) -> String {
        format!("{}/{}", self.workflows_url, id.as_str())
    }

    /// Sends a request, retrying transient failures per the retry policy.
    ///
    /// Returns the last response even when it is not a success; only
    /// failures to get any response are errors.
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&WorkflowPayload<'_>>,
    ) -> Result<Response, TransportError> {
        let max_attempts = self.retry().max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let mut request = self.client.request(method.clone(), url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if !self.config.api_key.is_empty() {
                request = request.header(self.config.api_key_header.as_str(), &self.config.api_key);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success()
                        && attempt < max_attempts
                        && self.retry().should_retry_status(&method, status)
                    {
                        let delay = self.retry().backoff_delay(attempt);
                        debug!(%method, url, %status, attempt, ?delay, "retrying request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if attempt < max_attempts && self.retry().should_retry_error(&method, &err) {
                        let delay = self.retry().backoff_delay(attempt);
                        debug!(%method, url, error = %err, attempt, "retrying after transport error");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    warn!(%method, url, error = %err, attempt, "request failed");
                    return Err(TransportError::Request {
                        message: err.to_string(),
                    });
                }
            }
        }

        Err(TransportError::Request {
            message: format!("{method} {url}: no attempt was made"),
        })
    }

    /// Maps a response to its decoded body or a transport error.
    async fn decode<T: DeserializeOwned>(
        response: Response,
        id: Option<&WorkflowId>,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND
            && let Some(id) = id
        {
            return Err(TransportError::NotFound { id: id.clone() });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "instance returned an error");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| TransportError::Request {
            message: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl WorkflowTransport for HttpTransport {
    #[instrument(skip_all, fields(base_url = %self.config.base_url))]
    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>, TransportError> {
        let mut workflows = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("limit", self.config.page_size.to_string())];
            if let Some(active) = filter.active {
                query.push(("active", active.to_string()));
            }
            if let Some(cursor) = cursor.take() {
                query.push(("cursor", cursor));
            }

            let response = self
                .send(Method::GET, &self.workflows_url, &query, None)
                .await?;
            let page: WorkflowPage = Self::decode(response, None).await?;
            debug!(count = page.data.len(), "fetched workflow page");
            workflows.extend(page.data.into_iter().filter(|w| filter.matches(w)));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(workflows)
    }

    #[instrument(skip_all, fields(workflow = %workflow.name))]
    async fn create(&self, workflow: &Workflow) -> Result<Workflow, TransportError> {
        let payload = WorkflowPayload::from(workflow);
        let response = self
            .send(Method::POST, &self.workflows_url, &[], Some(&payload))
            .await?;
        let created: Workflow = Self::decode(response, None).await?;
        debug!(new_id = %created.id, "workflow created");
        Ok(created)
    }

    #[instrument(skip_all, fields(workflow = %workflow.name, %id))]
    async fn update(
        &self,
        id: &WorkflowId,
        workflow: &Workflow,
    ) -> Result<Workflow, TransportError> {
        let payload = WorkflowPayload::from(workflow);
        let response = self
            .send(Method::PUT, &self.workflow_url(id), &[], Some(&payload))
            .await?;
        Self::decode(response, Some(id)).await
    }

    #[instrument(skip_all, fields(%id))]
    async fn get(&self, id: &WorkflowId) -> Result<Workflow, TransportError> {
        let response = self
            .send(Method::GET, &self.workflow_url(id), &[], None)
            .await?;
        Self::decode(response, Some(id)).await
    }
}
