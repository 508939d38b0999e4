//! The trigger engine and its collaborators.

use crate::backend::{BackendKind, SchedulingBackend};
use crate::ledger::TriggerSession;
use retrig_core::memory::MemoryCi;
use retrig_core::ports::{
    ArtifactProbe, BuilderCatalog, DependencyMapper, QuerySource, RevisionHistory,
};
use retrig_core::{BuilderName, Error, RepoName, RequestId, Result, Revision, TriggerResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Which query source answers job queries for ranges and backfills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySourceKind {
    /// The build-status backend.
    #[default]
    BuildApi,
    /// The UI aggregation backend.
    Treeherder,
}

/// Decides what to trigger and issues the requests.
///
/// Collaborators are chosen once, at construction. The only mutable state of a
/// run lives in the [`TriggerSession`] passed to each call.
pub struct TriggerEngine {
    pub(crate) build_source: Arc<dyn QuerySource>,
    pub(crate) aggregated_source: Option<Arc<dyn QuerySource>>,
    pub(crate) active_source: QuerySourceKind,
    pub(crate) history: Arc<dyn RevisionHistory>,
    pub(crate) catalog: Arc<dyn BuilderCatalog>,
    pub(crate) mapper: Arc<dyn DependencyMapper>,
    pub(crate) probe: Arc<dyn ArtifactProbe>,
    pub(crate) backend: SchedulingBackend,
    builders_file: Option<PathBuf>,
}

impl TriggerEngine {
    pub fn new(
        build_source: Arc<dyn QuerySource>,
        history: Arc<dyn RevisionHistory>,
        catalog: Arc<dyn BuilderCatalog>,
        mapper: Arc<dyn DependencyMapper>,
        probe: Arc<dyn ArtifactProbe>,
        backend: SchedulingBackend,
    ) -> Self {
        Self {
            build_source,
            aggregated_source: None,
            active_source: QuerySourceKind::default(),
            history,
            catalog,
            mapper,
            probe,
            backend,
            builders_file: None,
        }
    }

    /// Wire every collaborator to one in-memory world.
    pub fn from_world(world: Arc<MemoryCi>, backend: BackendKind) -> Self {
        let backend = SchedulingBackend::select(backend, world.clone(), world.clone());
        Self::new(
            world.clone(),
            world.clone(),
            world.clone(),
            world.clone(),
            world.clone(),
            backend,
        )
        .with_aggregated_source(world)
    }

    pub fn with_aggregated_source(mut self, source: Arc<dyn QuerySource>) -> Self {
        self.aggregated_source = Some(source);
        self
    }

    /// Where to dump the builder catalog when an unknown builder is requested.
    pub fn with_builders_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.builders_file = Some(path.into());
        self
    }

    pub fn set_query_source(&mut self, kind: QuerySourceKind) {
        tracing::debug!(?kind, "Switching query source");
        self.active_source = kind;
    }

    pub fn query_source_kind(&self) -> QuerySourceKind {
        self.active_source
    }

    /// The query source selected for ranges and backfills.
    pub(crate) fn query_source(&self) -> &dyn QuerySource {
        match (self.active_source, &self.aggregated_source) {
            (QuerySourceKind::Treeherder, Some(source)) => source.as_ref(),
            (QuerySourceKind::Treeherder, None) => {
                tracing::debug!("No aggregated query source configured, using the build API");
                self.build_source.as_ref()
            }
            (QuerySourceKind::BuildApi, _) => self.build_source.as_ref(),
        }
    }

    pub fn backend(&self) -> &SchedulingBackend {
        &self.backend
    }

    /// Return the list of all builders.
    pub async fn query_builders(&self) -> Result<Vec<BuilderName>> {
        self.catalog.list_builders().await
    }

    /// Determine if a builder exists.
    ///
    /// When it does not, the sorted catalog is written to the builders file so
    /// the operator can pick a valid name.
    pub async fn valid_builder(&self, builder: &BuilderName) -> Result<bool> {
        let mut builders = self.query_builders().await?;
        if builders.contains(builder) {
            tracing::debug!(%builder, "Builder is valid");
            return Ok(true);
        }

        tracing::warn!(%builder, "Builder is NOT valid");
        if let Some(path) = &self.builders_file {
            builders.sort();
            let content: String = builders.iter().map(|b| format!("{b}\n")).collect();
            match std::fs::write(path, content) {
                Ok(()) => tracing::info!(
                    path = %path.display(),
                    "Check this file for a list of valid builders"
                ),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not write builders file"),
            }
        }
        Ok(false)
    }

    pub(crate) async fn ensure_valid_builder(&self, builder: &BuilderName) -> Result<()> {
        if self.valid_builder(builder).await? {
            Ok(())
        } else {
            Err(Error::UnknownBuilder(builder.to_string()))
        }
    }

    /// Repository name and URL of the repository a builder runs on.
    pub async fn query_repo_of(&self, builder: &BuilderName) -> Result<(RepoName, String)> {
        let repo = self.mapper.repo_name_for(builder).await?;
        let url = self.history.repo_url(&repo).await?;
        Ok((repo, url))
    }

    /// Return the revisions between two pushes of a repository, oldest first.
    pub async fn query_revisions_range(
        &self,
        repo: &RepoName,
        from: &Revision,
        to: &Revision,
    ) -> Result<Vec<Revision>> {
        let url = self.history.repo_url(repo).await?;
        self.history.revisions_in_range(&url, from, to).await
    }

    /// Send one trigger request for `builder`.
    ///
    /// Build builders are recorded in the session before the request is sent:
    /// a request that fails in transport may still have landed.
    pub async fn trigger(
        &self,
        session: &mut TriggerSession,
        builder: &BuilderName,
        revision: &Revision,
        files: &[String],
        dry_run: bool,
        extra_properties: Option<&serde_json::Value>,
    ) -> Result<TriggerResult> {
        let repo = self.mapper.repo_name_for(builder).await?;
        if !self.mapper.is_downstream(builder).await? {
            session.record(revision, builder);
        }
        self.backend
            .trigger(&repo, builder, revision, files, dry_run, extra_properties)
            .await
    }

    pub async fn cancel(&self, repo: &RepoName, request_id: &RequestId) -> Result<()> {
        tracing::info!(%repo, %request_id, "Cancelling request");
        self.backend.cancel(repo, request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrig_core::memory::{BuilderEntry, RepositoryEntry, Snapshot};

    fn world() -> Arc<MemoryCi> {
        let snapshot = Snapshot {
            repositories: vec![RepositoryEntry {
                name: RepoName::new("try"),
                url: "https://hg.example.org/try".to_string(),
                pushes: vec![Revision::parse("0123456789ab").unwrap()],
            }],
            builders: vec![
                BuilderEntry {
                    name: BuilderName::new("Linux try build"),
                    upstream: None,
                    repo: None,
                },
                BuilderEntry {
                    name: BuilderName::new("Android try build"),
                    upstream: None,
                    repo: None,
                },
            ],
            ..Snapshot::default()
        };
        Arc::new(MemoryCi::new(snapshot))
    }

    #[tokio::test]
    async fn test_invalid_builder_writes_builders_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builders.txt");
        let engine =
            TriggerEngine::from_world(world(), BackendKind::BuildApi).with_builders_file(&path);

        assert!(!engine.valid_builder(&BuilderName::new("nope")).await.unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Android try build\nLinux try build\n");
    }

    #[tokio::test]
    async fn test_trigger_records_build_builders() {
        let ci = world();
        let engine = TriggerEngine::from_world(ci.clone(), BackendKind::BuildApi);
        let mut session = TriggerSession::new();
        let build = BuilderName::new("Linux try build");
        let rev = Revision::parse("0123456789ab").unwrap();

        let result = engine
            .trigger(&mut session, &build, &rev, &[], false, None)
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(session.is_recorded(&rev, &build));
        assert_eq!(ci.trigger_count(&rev, &build).await, 1);
    }

    #[test]
    fn test_query_source_falls_back_without_aggregated_source() {
        let ci = world();
        let backend = SchedulingBackend::select(BackendKind::BuildApi, ci.clone(), ci.clone());
        let mut engine = TriggerEngine::new(
            ci.clone(),
            ci.clone(),
            ci.clone(),
            ci.clone(),
            ci.clone(),
            backend,
        );
        engine.set_query_source(QuerySourceKind::Treeherder);
        assert_eq!(engine.query_source_kind(), QuerySourceKind::Treeherder);
        assert!(std::ptr::addr_eq(engine.query_source(), ci.as_ref()));
    }

    #[test]
    fn test_query_source_follows_the_selected_kind() {
        let ci = world();
        let aggregated = world();
        let mut engine = TriggerEngine::from_world(ci.clone(), BackendKind::BuildApi)
            .with_aggregated_source(aggregated.clone());
        assert!(std::ptr::addr_eq(engine.query_source(), ci.as_ref()));

        engine.set_query_source(QuerySourceKind::Treeherder);
        assert!(std::ptr::addr_eq(engine.query_source(), aggregated.as_ref()));
    }
}
