//! High-level trigger operations built on ranges and backfill windows.

use crate::backfill::BackfillMode;
use crate::engine::{QuerySourceKind, TriggerEngine};
use crate::ledger::TriggerSession;
use crate::range::{RangeReport, TriggerRequest};
use retrig_core::{BuilderName, RepoName, Result, Revision};
use serde_json::json;

/// Builders containing any of these are never triggered as "missing" jobs.
pub const MISSING_JOBS_EXCLUDED: [&str; 3] = ["hg bundle", "b2g", "pgo"];

/// Repositories where PGO builders run.
pub const PGO_REPOS: [&str; 3] = ["mozilla-central", "mozilla-aurora", "mozilla-beta"];

/// Tag attached to every request so the backend can tell who asked for it.
pub fn request_tag(kind: &str, details: serde_json::Value) -> serde_json::Value {
    let mut request = json!({ "type": kind });
    if let (Some(request), serde_json::Value::Object(details)) = (request.as_object_mut(), details)
    {
        request.extend(details);
    }
    json!({ "retrig_request": request })
}

impl TriggerEngine {
    /// Builders of `repo` whose name contains none of `exclude`.
    pub async fn repo_builders(&self, repo: &RepoName, exclude: &[&str]) -> Result<Vec<BuilderName>> {
        let mut builders = Vec::new();
        for builder in self.query_builders().await? {
            if exclude.iter().any(|e| builder.as_str().contains(e)) {
                continue;
            }
            match self.mapper.repo_name_for(&builder).await {
                Ok(r) if &r == repo => builders.push(builder),
                Ok(_) => {}
                Err(e) => tracing::debug!(%builder, error = %e, "Skipping builder"),
            }
        }
        Ok(builders)
    }

    /// Trigger every builder of `repo` that has no job on `revision` yet.
    pub async fn trigger_missing_jobs_for_revision(
        &self,
        session: &mut TriggerSession,
        repo: &RepoName,
        revision: &Revision,
        dry_run: bool,
    ) -> Result<Vec<RangeReport>> {
        let tag = request_tag("trigger_missing_jobs_for_revision", json!({}));
        let mut reports = Vec::new();
        for builder in self.repo_builders(repo, &MISSING_JOBS_EXCLUDED).await? {
            let request = TriggerRequest::new(builder)
                .dry_run(dry_run)
                .extra_properties(tag.clone());
            reports.push(
                self.trigger_range(session, std::slice::from_ref(revision), &request)
                    .await?,
            );
        }
        Ok(reports)
    }

    /// Trigger every builder of a test suite (e.g. `talos`) on `revision`.
    /// PGO builders are only used on repositories that run PGO.
    pub async fn trigger_suite_jobs(
        &self,
        session: &mut TriggerSession,
        repo: &RepoName,
        revision: &Revision,
        suite: &str,
        times: u32,
        dry_run: bool,
    ) -> Result<Vec<RangeReport>> {
        let exclude: &[&str] = if PGO_REPOS.contains(&repo.as_str()) {
            &[]
        } else {
            &["pgo"]
        };
        let tag = request_tag(
            "trigger_suite_jobs",
            json!({ "suite": suite, "times": times }),
        );

        let mut reports = Vec::new();
        for builder in self.repo_builders(repo, exclude).await? {
            if !builder.as_str().contains(suite) {
                continue;
            }
            let request = TriggerRequest::new(builder)
                .times(times)
                .dry_run(dry_run)
                .extra_properties(tag.clone());
            reports.push(
                self.trigger_range(session, std::slice::from_ref(revision), &request)
                    .await?,
            );
        }
        Ok(reports)
    }

    /// Backfill `builder` on up to `max_revisions` pushes before `revision`,
    /// stopping at the last push with any job for it.
    ///
    /// Job data comes from the aggregated query source for the duration of the call.
    pub async fn manual_backfill(
        &mut self,
        session: &mut TriggerSession,
        revision: &Revision,
        builder: &BuilderName,
        max_revisions: usize,
        dry_run: bool,
    ) -> Result<RangeReport> {
        let previous = self.query_source_kind();
        self.set_query_source(QuerySourceKind::Treeherder);
        let report = self
            .run_manual_backfill(session, revision, builder, max_revisions, dry_run)
            .await;
        self.set_query_source(previous);
        report
    }

    async fn run_manual_backfill(
        &self,
        session: &mut TriggerSession,
        revision: &Revision,
        builder: &BuilderName,
        max_revisions: usize,
        dry_run: bool,
    ) -> Result<RangeReport> {
        let (_, repo_url) = self.query_repo_of(builder).await?;
        // The pushes before `revision`, without `revision` itself.
        let revlist = self
            .history
            .revisions_around(&repo_url, revision, max_revisions, -1)
            .await?;
        let window = self
            .filter_backfill_revlist(builder, &revlist, BackfillMode::AnyStatus)
            .await?;

        let request = TriggerRequest::new(builder.clone())
            .dry_run(dry_run)
            .extra_properties(request_tag(
                "manual_backfill",
                json!({ "builders": [builder.as_str()] }),
            ));
        self.trigger_range(session, &window, &request).await
    }

    /// Revisions to trigger to backfill `builder` automatically: the
    /// `max_revisions` pushes ending at `revision`, newest first, up to the last
    /// one with a successful job.
    pub async fn find_backfill_revlist(
        &self,
        repo_url: &str,
        revision: &Revision,
        max_revisions: usize,
        builder: &BuilderName,
    ) -> Result<Vec<Revision>> {
        let revlist = self
            .history
            .revisions_around(repo_url, revision, max_revisions.saturating_sub(1), 0)
            .await?;
        self.filter_backfill_revlist(builder, &revlist, BackfillMode::SuccessfulOnly)
            .await
    }
}
