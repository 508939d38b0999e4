//! Scheduling backends.
//!
//! Three ways of getting jobs scheduled, selected once from configuration:
//!
//! * [`SchedulingBackend::BuildApi`] triggers one builder per request and
//!   retriggers or cancels by build request id.
//! * [`SchedulingBackend::TaskCluster`] only takes whole task graphs and
//!   retriggers single tasks.
//! * [`SchedulingBackend::BuildbotBridge`] runs builders through task graphs,
//!   so single builders are submitted as one-task graphs.

use crate::graph::{BuildersGraph, generate_task_graph};
use retrig_core::ports::{BuildApiClient, TaskGraphClient};
use retrig_core::task::GraphResult;
use retrig_core::{BuilderName, Error, RepoName, RequestId, Result, Revision, TriggerResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    BuildApi,
    TaskCluster,
    Bridge,
}

/// Responses to the runs asked for by one retrigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetriggerOutcome {
    pub results: Vec<TriggerResult>,
    /// Runs whose request could not be sent.
    pub failures: Vec<String>,
}

impl RetriggerOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.results.iter().all(TriggerResult::is_success)
    }

    /// Runs that were rejected or could not be sent.
    pub fn failed_count(&self) -> usize {
        self.failures.len() + self.results.iter().filter(|r| !r.is_success()).count()
    }
}

pub enum SchedulingBackend {
    BuildApi(Arc<dyn BuildApiClient>),
    TaskCluster(Arc<dyn TaskGraphClient>),
    BuildbotBridge(Arc<dyn TaskGraphClient>),
}

impl SchedulingBackend {
    pub fn select(
        kind: BackendKind,
        build_api: Arc<dyn BuildApiClient>,
        task_graph: Arc<dyn TaskGraphClient>,
    ) -> Self {
        match kind {
            BackendKind::BuildApi => SchedulingBackend::BuildApi(build_api),
            BackendKind::TaskCluster => SchedulingBackend::TaskCluster(task_graph),
            BackendKind::Bridge => SchedulingBackend::BuildbotBridge(task_graph),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SchedulingBackend::BuildApi(_) => "buildapi",
            SchedulingBackend::TaskCluster(_) => "taskcluster",
            SchedulingBackend::BuildbotBridge(_) => "bridge",
        }
    }

    /// Schedule one run of `builder`. Dry runs only log the request.
    pub async fn trigger(
        &self,
        repo: &RepoName,
        builder: &BuilderName,
        revision: &Revision,
        files: &[String],
        dry_run: bool,
        extra_properties: Option<&serde_json::Value>,
    ) -> Result<TriggerResult> {
        if dry_run {
            tracing::info!(
                backend = self.name(),
                %repo,
                %builder,
                %revision,
                ?files,
                "Dry-run: not sending trigger request"
            );
            return Ok(TriggerResult::simulated());
        }

        match self {
            SchedulingBackend::BuildApi(client) => {
                client
                    .trigger_arbitrary_job(repo, builder, revision, files, extra_properties)
                    .await
            }
            SchedulingBackend::TaskCluster(_) => Err(Error::Unsupported {
                backend: self.name(),
                operation: "arbitrary job",
            }),
            SchedulingBackend::BuildbotBridge(client) => {
                let mut builders = BuildersGraph::new();
                builders.insert(builder.clone(), vec![]);
                let graph =
                    generate_task_graph(repo, revision, &builders, files, extra_properties)?;
                let result = client.create_task_graph(&graph).await?;
                Ok(TriggerResult::accepted(result.graph_id, result.http_status))
            }
        }
    }

    /// Ask for `count` more runs of an existing request.
    ///
    /// Task backends retrigger one run per request. Every run is attempted;
    /// rejections and send errors are collected in the outcome.
    pub async fn retrigger(
        &self,
        repo: &RepoName,
        request_id: &RequestId,
        count: u32,
        dry_run: bool,
    ) -> Result<RetriggerOutcome> {
        let mut outcome = RetriggerOutcome::default();
        if dry_run {
            tracing::info!(
                backend = self.name(),
                %repo,
                %request_id,
                count,
                "Dry-run: not sending retrigger request"
            );
            outcome.results.push(TriggerResult::simulated());
            return Ok(outcome);
        }

        match self {
            SchedulingBackend::BuildApi(client) => {
                let result = client.make_retrigger_request(repo, request_id, count).await?;
                outcome.results.push(result);
            }
            SchedulingBackend::TaskCluster(client) | SchedulingBackend::BuildbotBridge(client) => {
                for _ in 0..count {
                    match client.retrigger_task(request_id).await {
                        Ok(result) => outcome.results.push(result),
                        Err(e) if e.is_configuration() => return Err(e),
                        Err(e) => {
                            tracing::warn!(%request_id, error = %e, "Retrigger request failed");
                            outcome.failures.push(e.to_string());
                        }
                    }
                }
            }
        }
        Ok(outcome)
    }

    pub async fn cancel(&self, repo: &RepoName, request_id: &RequestId) -> Result<()> {
        match self {
            SchedulingBackend::BuildApi(client) => {
                client.make_cancel_request(repo, request_id).await
            }
            _ => Err(Error::Unsupported {
                backend: self.name(),
                operation: "cancel",
            }),
        }
    }

    /// Submit a whole builders graph for one revision.
    pub async fn schedule_graph(
        &self,
        repo: &RepoName,
        revision: &Revision,
        builders: &BuildersGraph,
        dry_run: bool,
    ) -> Result<GraphResult> {
        let client = match self {
            SchedulingBackend::BuildApi(_) => {
                return Err(Error::Unsupported {
                    backend: self.name(),
                    operation: "task graph",
                });
            }
            SchedulingBackend::TaskCluster(client) | SchedulingBackend::BuildbotBridge(client) => {
                client
            }
        };

        let graph = generate_task_graph(repo, revision, builders, &[], None)?;
        if dry_run {
            tracing::info!(
                backend = self.name(),
                %revision,
                tasks = graph.tasks.len(),
                "Dry-run: not submitting task graph"
            );
            return Ok(GraphResult {
                graph_id: graph.graph_id.into(),
                task_count: graph.tasks.len(),
                http_status: 0,
                dry_run: true,
            });
        }
        client.create_task_graph(&graph).await
    }
}
