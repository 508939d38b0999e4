//! In-memory CI world.
//!
//! [`MemoryCi`] implements every port over a [`Snapshot`] of repositories,
//! builders and jobs. It is what the CLI runs against when pointed at a snapshot
//! file, and what the test suites use. Backend calls are recorded, never applied
//! to the snapshot: triggered jobs do not appear in later queries.

use crate::error::{Error, QueryError};
use crate::ids::{BuilderName, RepoName, RequestId, Revision};
use crate::job::{Job, JobStatus, TriggerResult};
use crate::ports::{
    ArtifactProbe, BuildApiClient, BuilderCatalog, DependencyMapper, QuerySource,
    RevisionHistory, TaskGraphClient,
};
use crate::task::{GraphResult, TaskGraph};
use crate::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Serializable description of a CI world.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
    #[serde(default)]
    pub builders: Vec<BuilderEntry>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    /// Artifact URLs that can be downloaded.
    #[serde(default)]
    pub reachable_urls: BTreeSet<String>,
    /// Requests whose status the backend cannot report.
    #[serde(default)]
    pub broken_status: BTreeSet<RequestId>,
    /// HTTP status returned for every trigger request.
    #[serde(default = "default_trigger_status")]
    pub trigger_status: u16,
}

fn default_trigger_status() -> u16 {
    202
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            repositories: vec![],
            builders: vec![],
            jobs: vec![],
            reachable_urls: BTreeSet::new(),
            broken_status: BTreeSet::new(),
            trigger_status: default_trigger_status(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RepositoryEntry {
    pub name: RepoName,
    pub url: String,
    /// Pushed revisions, oldest first.
    #[serde(default)]
    pub pushes: Vec<Revision>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuilderEntry {
    pub name: BuilderName,
    /// Build builder this builder depends on; absent for build builders.
    #[serde(default)]
    pub upstream: Option<BuilderName>,
    /// Repository override when it cannot be inferred from the name.
    #[serde(default)]
    pub repo: Option<RepoName>,
}

impl Snapshot {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_yaml::from_str(content)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check revision identifiers, which deserialization does not normalize.
    pub fn validate(&self) -> Result<()> {
        let pushes = self.repositories.iter().flat_map(|r| r.pushes.iter());
        let job_revisions = self.jobs.iter().map(|j| &j.revision);
        match pushes.chain(job_revisions).find(|r| !r.is_well_formed()) {
            Some(bad) => Err(Error::InvalidRevision(bad.to_string())),
            None => Ok(()),
        }
    }

    fn repository_by_url(&self, url: &str) -> Result<&RepositoryEntry> {
        self.repositories
            .iter()
            .find(|r| r.url == url)
            .ok_or_else(|| Error::UnknownRepository(url.to_string()))
    }

    fn builder(&self, name: &BuilderName) -> Option<&BuilderEntry> {
        self.builders.iter().find(|b| &b.name == name)
    }
}

/// A backend call recorded by [`MemoryCi`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum BackendCall {
    Trigger {
        repo: RepoName,
        builder: BuilderName,
        revision: Revision,
        files: Vec<String>,
        extra_properties: Option<serde_json::Value>,
    },
    Retrigger {
        repo: RepoName,
        request_id: RequestId,
        count: u32,
    },
    Cancel {
        repo: RepoName,
        request_id: RequestId,
    },
    TaskGraph {
        graph_id: RequestId,
        revision: Revision,
        builders: Vec<BuilderName>,
    },
    RetriggerTask {
        task_id: RequestId,
    },
}

pub struct MemoryCi {
    snapshot: Snapshot,
    calls: Mutex<Vec<BackendCall>>,
    next_request: AtomicU64,
}

impl MemoryCi {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            calls: Mutex::new(Vec::new()),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(Snapshot::from_yaml(&content)?))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// All backend calls made so far, in order.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    /// Number of trigger calls (direct or through a task graph) for a builder on a revision.
    pub async fn trigger_count(&self, revision: &Revision, builder: &BuilderName) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| match call {
                BackendCall::Trigger {
                    revision: r,
                    builder: b,
                    ..
                } => r == revision && b == builder,
                BackendCall::TaskGraph {
                    revision: r,
                    builders,
                    ..
                } => r == revision && builders.contains(builder),
                _ => false,
            })
            .count()
    }

    async fn record(&self, call: BackendCall) {
        tracing::debug!(?call, "Recording backend call");
        self.calls.lock().await.push(call);
    }

    fn next_request_id(&self) -> RequestId {
        let n = self.next_request.fetch_add(1, Ordering::Relaxed);
        RequestId::new(format!("req-{n}"))
    }

    fn infer_repo(&self, builder: &BuilderName) -> Option<RepoName> {
        let name = builder.as_str();
        self.snapshot
            .repositories
            .iter()
            .find(|repo| {
                let r = repo.name.as_str();
                [format!(" {r} "), format!("_{r}_"), format!("-{r}-")]
                    .iter()
                    .any(|pattern| name.contains(pattern.as_str()))
            })
            .map(|repo| repo.name.clone())
    }
}

#[async_trait]
impl QuerySource for MemoryCi {
    async fn get_matching_jobs(
        &self,
        _repo: &RepoName,
        revision: &Revision,
        builder: &BuilderName,
    ) -> Result<Vec<Job>> {
        Ok(self
            .snapshot
            .jobs
            .iter()
            .filter(|j| &j.revision == revision && &j.builder == builder)
            .cloned()
            .collect())
    }

    async fn get_job_status(&self, job: &Job) -> std::result::Result<JobStatus, QueryError> {
        if self.snapshot.broken_status.contains(&job.request_id) {
            return Err(QueryError::StatusUnavailable {
                request_id: job.request_id.to_string(),
            });
        }
        Ok(job.status)
    }

    async fn get_job_properties(
        &self,
        job: &Job,
    ) -> std::result::Result<Option<BTreeMap<String, String>>, QueryError> {
        Ok(job.properties.clone())
    }

    async fn get_backend_request_id(&self, _repo: &RepoName, job: &Job) -> Result<RequestId> {
        Ok(job.request_id.clone())
    }
}

#[async_trait]
impl RevisionHistory for MemoryCi {
    async fn repo_url(&self, repo: &RepoName) -> Result<String> {
        self.snapshot
            .repositories
            .iter()
            .find(|r| &r.name == repo)
            .map(|r| r.url.clone())
            .ok_or_else(|| Error::UnknownRepository(repo.to_string()))
    }

    async fn is_valid_revision(&self, repo_url: &str, revision: &Revision) -> Result<bool> {
        let repo = self.snapshot.repository_by_url(repo_url)?;
        Ok(repo.pushes.contains(revision))
    }

    async fn revisions_in_range(
        &self,
        repo_url: &str,
        from: &Revision,
        to: &Revision,
    ) -> Result<Vec<Revision>> {
        let repo = self.snapshot.repository_by_url(repo_url)?;
        let position = |rev: &Revision| {
            repo.pushes
                .iter()
                .position(|p| p == rev)
                .ok_or_else(|| Error::InvalidRevision(rev.to_string()))
        };
        let (a, b) = (position(from)?, position(to)?);
        let (start, end) = (a.min(b), a.max(b));
        Ok(repo.pushes[start..=end].to_vec())
    }

    async fn revisions_around(
        &self,
        repo_url: &str,
        revision: &Revision,
        before: usize,
        after: i64,
    ) -> Result<Vec<Revision>> {
        let repo = self.snapshot.repository_by_url(repo_url)?;
        let Some(index) = repo.pushes.iter().position(|p| p == revision) else {
            return Err(Error::InvalidRevision(revision.to_string()));
        };
        let start = index.saturating_sub(before) as i64;
        let end = (index as i64 + after).min(repo.pushes.len() as i64 - 1);
        if end < start {
            return Ok(vec![]);
        }
        Ok(repo.pushes[start as usize..=end as usize]
            .iter()
            .rev()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BuilderCatalog for MemoryCi {
    async fn list_builders(&self) -> Result<Vec<BuilderName>> {
        Ok(self.snapshot.builders.iter().map(|b| b.name.clone()).collect())
    }
}

#[async_trait]
impl DependencyMapper for MemoryCi {
    async fn upstream_build_builder(&self, builder: &BuilderName) -> Result<BuilderName> {
        let entry = self
            .snapshot
            .builder(builder)
            .ok_or_else(|| Error::UnknownBuilder(builder.to_string()))?;
        Ok(entry.upstream.clone().unwrap_or_else(|| entry.name.clone()))
    }

    async fn repo_name_for(&self, builder: &BuilderName) -> Result<RepoName> {
        if let Some(repo) = self.snapshot.builder(builder).and_then(|b| b.repo.clone()) {
            return Ok(repo);
        }
        self.infer_repo(builder).ok_or_else(|| {
            Error::UnknownRepository(format!("no repository name found in builder '{builder}'"))
        })
    }
}

#[async_trait]
impl ArtifactProbe for MemoryCi {
    async fn all_reachable(&self, urls: &[String]) -> bool {
        urls.iter().all(|u| self.snapshot.reachable_urls.contains(u))
    }
}

#[async_trait]
impl BuildApiClient for MemoryCi {
    async fn trigger_arbitrary_job(
        &self,
        repo: &RepoName,
        builder: &BuilderName,
        revision: &Revision,
        files: &[String],
        extra_properties: Option<&serde_json::Value>,
    ) -> Result<TriggerResult> {
        self.record(BackendCall::Trigger {
            repo: repo.clone(),
            builder: builder.clone(),
            revision: revision.clone(),
            files: files.to_vec(),
            extra_properties: extra_properties.cloned(),
        })
        .await;
        Ok(TriggerResult::accepted(
            self.next_request_id(),
            self.snapshot.trigger_status,
        ))
    }

    async fn make_retrigger_request(
        &self,
        repo: &RepoName,
        request_id: &RequestId,
        count: u32,
    ) -> Result<TriggerResult> {
        self.record(BackendCall::Retrigger {
            repo: repo.clone(),
            request_id: request_id.clone(),
            count,
        })
        .await;
        Ok(TriggerResult::accepted(
            self.next_request_id(),
            self.snapshot.trigger_status,
        ))
    }

    async fn make_cancel_request(&self, repo: &RepoName, request_id: &RequestId) -> Result<()> {
        self.record(BackendCall::Cancel {
            repo: repo.clone(),
            request_id: request_id.clone(),
        })
        .await;
        Ok(())
    }
}

#[async_trait]
impl TaskGraphClient for MemoryCi {
    async fn create_task_graph(&self, graph: &TaskGraph) -> Result<GraphResult> {
        let graph_id = RequestId::from(graph.graph_id);
        self.record(BackendCall::TaskGraph {
            graph_id: graph_id.clone(),
            revision: graph.revision.clone(),
            builders: graph.tasks.iter().map(|t| t.builder.clone()).collect(),
        })
        .await;
        Ok(GraphResult {
            graph_id,
            task_count: graph.tasks.len(),
            http_status: self.snapshot.trigger_status,
            dry_run: false,
        })
    }

    async fn retrigger_task(&self, task_id: &RequestId) -> Result<TriggerResult> {
        self.record(BackendCall::RetriggerTask {
            task_id: task_id.clone(),
        })
        .await;
        Ok(TriggerResult::accepted(
            self.next_request_id(),
            self.snapshot.trigger_status,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"
repositories:
  - name: mozilla-inbound
    url: https://hg.example.org/integration/mozilla-inbound
    pushes: [aaaaaaaaaaa1, aaaaaaaaaaa2, aaaaaaaaaaa3, aaaaaaaaaaa4, aaaaaaaaaaa5]
builders:
  - name: Linux mozilla-inbound build
  - name: Ubuntu VM mozilla-inbound opt test mochitest-1
    upstream: Linux mozilla-inbound build
jobs:
  - builder: Linux mozilla-inbound build
    revision: aaaaaaaaaaa3
    status: success
    request_id: "17"
"#;

    fn rev(s: &str) -> Revision {
        Revision::parse(s).unwrap()
    }

    fn world() -> MemoryCi {
        MemoryCi::new(Snapshot::from_yaml(SNAPSHOT).unwrap())
    }

    const URL: &str = "https://hg.example.org/integration/mozilla-inbound";

    #[tokio::test]
    async fn test_revisions_around_is_newest_first() {
        let ci = world();
        let revs = ci
            .revisions_around(URL, &rev("aaaaaaaaaaa4"), 2, 0)
            .await
            .unwrap();
        assert_eq!(
            revs,
            vec![rev("aaaaaaaaaaa4"), rev("aaaaaaaaaaa3"), rev("aaaaaaaaaaa2")]
        );
    }

    #[tokio::test]
    async fn test_revisions_around_negative_after_excludes_pivot() {
        let ci = world();
        let revs = ci
            .revisions_around(URL, &rev("aaaaaaaaaaa4"), 10, -1)
            .await
            .unwrap();
        assert_eq!(
            revs,
            vec![rev("aaaaaaaaaaa3"), rev("aaaaaaaaaaa2"), rev("aaaaaaaaaaa1")]
        );
    }

    #[tokio::test]
    async fn test_revisions_in_range_accepts_reversed_bounds() {
        let ci = world();
        let revs = ci
            .revisions_in_range(URL, &rev("aaaaaaaaaaa4"), &rev("aaaaaaaaaaa2"))
            .await
            .unwrap();
        assert_eq!(revs.len(), 3);
        assert_eq!(revs[0], rev("aaaaaaaaaaa2"));
    }

    #[tokio::test]
    async fn test_repo_name_inferred_from_builder_name() {
        let ci = world();
        let repo = ci
            .repo_name_for(&BuilderName::new("Windows 7 mozilla-inbound pgo talos"))
            .await
            .unwrap();
        assert_eq!(repo, RepoName::new("mozilla-inbound"));
        assert!(ci.repo_name_for(&BuilderName::new("nowhere")).await.is_err());
    }

    #[tokio::test]
    async fn test_upstream_of_build_is_itself() {
        let ci = world();
        let build = BuilderName::new("Linux mozilla-inbound build");
        let test = BuilderName::new("Ubuntu VM mozilla-inbound opt test mochitest-1");
        assert_eq!(ci.upstream_build_builder(&build).await.unwrap(), build);
        assert_eq!(ci.upstream_build_builder(&test).await.unwrap(), build);
        assert!(ci.is_downstream(&test).await.unwrap());
        assert!(!ci.is_downstream(&build).await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_calls_are_recorded() {
        let ci = world();
        let build = BuilderName::new("Linux mozilla-inbound build");
        let result = ci
            .trigger_arbitrary_job(
                &RepoName::new("mozilla-inbound"),
                &build,
                &rev("aaaaaaaaaaa5"),
                &[],
                None,
            )
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(ci.trigger_count(&rev("aaaaaaaaaaa5"), &build).await, 1);
    }

    #[test]
    fn test_snapshot_rejects_malformed_revisions() {
        let bad = "repositories:\n  - name: r\n    url: u\n    pushes: [tip]\n";
        assert!(matches!(
            Snapshot::from_yaml(bad),
            Err(Error::InvalidRevision(_))
        ));
    }
}
