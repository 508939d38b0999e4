//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the trigger-decision engine and
//! the CI services it talks to. Every call stands for a blocking network round
//! trip; the engine awaits them one at a time.

use crate::error::QueryError;
use crate::ids::{BuilderName, RepoName, RequestId, Revision};
use crate::job::{Job, JobStatus, TriggerResult};
use crate::task::{GraphResult, TaskGraph};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Source of job information for a revision.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Get all jobs of `builder` on `revision`.
    async fn get_matching_jobs(
        &self,
        repo: &RepoName,
        revision: &Revision,
        builder: &BuilderName,
    ) -> Result<Vec<Job>>;

    /// Get the current status of a job.
    async fn get_job_status(&self, job: &Job) -> std::result::Result<JobStatus, QueryError>;

    /// Get the properties the backend recorded for a finished job.
    ///
    /// This can take a while: it may need to download the backend's status dump.
    async fn get_job_properties(
        &self,
        job: &Job,
    ) -> std::result::Result<Option<BTreeMap<String, String>>, QueryError>;

    /// Get the request id the scheduling backend knows this job by.
    async fn get_backend_request_id(&self, repo: &RepoName, job: &Job) -> Result<RequestId>;
}

/// Push history of repositories.
#[async_trait]
pub trait RevisionHistory: Send + Sync {
    /// Get the full URL of a repository.
    async fn repo_url(&self, repo: &RepoName) -> Result<String>;

    /// Check that a revision was pushed to the repository.
    async fn is_valid_revision(&self, repo_url: &str, revision: &Revision) -> Result<bool>;

    /// Revisions from `from` to `to` (both included), oldest first.
    async fn revisions_in_range(
        &self,
        repo_url: &str,
        from: &Revision,
        to: &Revision,
    ) -> Result<Vec<Revision>>;

    /// Revisions from `before` pushes before `revision` up to `after` pushes after it,
    /// newest first. A negative `after` stops short of `revision` itself.
    async fn revisions_around(
        &self,
        repo_url: &str,
        revision: &Revision,
        before: usize,
        after: i64,
    ) -> Result<Vec<Revision>>;
}

/// Catalog of every builder the CI knows about.
#[async_trait]
pub trait BuilderCatalog: Send + Sync {
    async fn list_builders(&self) -> Result<Vec<BuilderName>>;
}

/// Maps builders to their upstream build and their repository.
#[async_trait]
pub trait DependencyMapper: Send + Sync {
    /// The build builder producing the artifacts `builder` consumes.
    /// A build builder maps to itself.
    async fn upstream_build_builder(&self, builder: &BuilderName) -> Result<BuilderName>;

    async fn repo_name_for(&self, builder: &BuilderName) -> Result<RepoName>;

    /// Test builders are downstream of a build.
    async fn is_downstream(&self, builder: &BuilderName) -> Result<bool> {
        Ok(&self.upstream_build_builder(builder).await? != builder)
    }
}

/// Checks that artifact URLs can be downloaded.
#[async_trait]
pub trait ArtifactProbe: Send + Sync {
    async fn all_reachable(&self, urls: &[String]) -> bool;
}

/// Client of a build-request API that triggers one builder at a time.
#[async_trait]
pub trait BuildApiClient: Send + Sync {
    async fn trigger_arbitrary_job(
        &self,
        repo: &RepoName,
        builder: &BuilderName,
        revision: &Revision,
        files: &[String],
        extra_properties: Option<&serde_json::Value>,
    ) -> Result<TriggerResult>;

    /// Ask for `count` more runs of an existing request.
    async fn make_retrigger_request(
        &self,
        repo: &RepoName,
        request_id: &RequestId,
        count: u32,
    ) -> Result<TriggerResult>;

    async fn make_cancel_request(&self, repo: &RepoName, request_id: &RequestId) -> Result<()>;
}

/// Client of a task-graph scheduler.
#[async_trait]
pub trait TaskGraphClient: Send + Sync {
    async fn create_task_graph(&self, graph: &TaskGraph) -> Result<GraphResult>;

    async fn retrigger_task(&self, task_id: &RequestId) -> Result<TriggerResult>;
}
