//! Trigger range scheduling.
//!
//! Gets a builder to `times` runs on each revision of a range, counting the
//! jobs that already exist and retriggering them rather than creating new ones
//! where possible.

use crate::engine::TriggerEngine;
use crate::ledger::TriggerSession;
use crate::objective::{BlockReason, TriggerObjective};
use crate::summary::summarize;
use retrig_core::{BuilderName, RepoName, RequestId, Result, Revision, TriggerResult};
use serde::Serialize;

/// A request to get `times` runs of a builder.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub builder: BuilderName,
    pub times: u32,
    /// Artifacts to run with. Skips build resolution and the session dedup.
    pub files: Option<Vec<String>>,
    pub dry_run: bool,
    pub extra_properties: Option<serde_json::Value>,
    pub trigger_build_if_missing: bool,
}

impl TriggerRequest {
    pub fn new(builder: impl Into<BuilderName>) -> Self {
        Self {
            builder: builder.into(),
            times: 1,
            files: None,
            dry_run: false,
            extra_properties: None,
            trigger_build_if_missing: true,
        }
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }

    /// An empty list means no files were given.
    pub fn files(mut self, files: Vec<String>) -> Self {
        self.files = (!files.is_empty()).then_some(files);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn extra_properties(mut self, properties: serde_json::Value) -> Self {
        self.extra_properties = Some(properties);
        self
    }

    pub fn trigger_build_if_missing(mut self, allowed: bool) -> Self {
        self.trigger_build_if_missing = allowed;
        self
    }
}

/// What [`TriggerEngine::trigger_job`] did on one revision.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    pub revision: Revision,
    pub requested: BuilderName,
    /// The builder requests were sent for; the upstream build when it was missing.
    pub triggered: Option<BuilderName>,
    pub results: Vec<TriggerResult>,
    /// Requests that failed to send. Other requests of the batch were still attempted.
    pub failures: Vec<String>,
    pub blocked: Option<BlockReason>,
}

impl TriggerOutcome {
    fn new(revision: &Revision, requested: &BuilderName) -> Self {
        Self {
            revision: revision.clone(),
            requested: requested.clone(),
            triggered: None,
            results: vec![],
            failures: vec![],
            blocked: None,
        }
    }

    fn blocked(mut self, reason: BlockReason) -> Self {
        self.blocked = Some(reason);
        self
    }
}

/// What happened on one revision of a range.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RevisionAction {
    InvalidRevision,
    /// Enough jobs exist or are on their way.
    Satisfied { potential: usize },
    Retriggered {
        request_id: RequestId,
        count: u32,
        results: Vec<TriggerResult>,
        failures: Vec<String>,
    },
    Triggered(TriggerOutcome),
    Failed { error: String },
}

/// Result of [`TriggerEngine::trigger_range`].
#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub builder: BuilderName,
    pub times: u32,
    pub revisions: Vec<(Revision, RevisionAction)>,
}

impl RangeReport {
    /// Responses that came back with a non-success status.
    pub fn non_success(&self) -> impl Iterator<Item = &TriggerResult> {
        self.revisions
            .iter()
            .flat_map(|(_, action)| match action {
                RevisionAction::Retriggered { results, .. } => results.as_slice(),
                RevisionAction::Triggered(outcome) => outcome.results.as_slice(),
                _ => &[][..],
            })
            .filter(|r| !r.is_success())
    }

    /// Errors of requests that could not be sent, per revision.
    pub fn failures(&self) -> Vec<(&Revision, &str)> {
        let mut failures = Vec::new();
        for (revision, action) in &self.revisions {
            match action {
                RevisionAction::Failed { error } => failures.push((revision, error.as_str())),
                RevisionAction::Retriggered {
                    failures: errors, ..
                } => failures.extend(errors.iter().map(|e| (revision, e.as_str()))),
                RevisionAction::Triggered(outcome) => {
                    failures.extend(outcome.failures.iter().map(|e| (revision, e.as_str())))
                }
                _ => {}
            }
        }
        failures
    }

    pub fn action(&self, revision: &Revision) -> Option<&RevisionAction> {
        self.revisions
            .iter()
            .find(|(r, _)| r == revision)
            .map(|(_, action)| action)
    }
}

impl TriggerEngine {
    /// Trigger `request.builder` on one revision `request.times` times, or its
    /// build once when the build is missing. Builds run at most once per
    /// revision and session.
    pub async fn trigger_job(
        &self,
        session: &mut TriggerSession,
        revision: &Revision,
        request: &TriggerRequest,
    ) -> Result<TriggerOutcome> {
        let (_, repo_url) = self.query_repo_of(&request.builder).await?;
        if !self.history.is_valid_revision(&repo_url, revision).await? {
            tracing::info!(%revision, "We can't trigger anything on pushes without a valid revision");
            return Ok(TriggerOutcome::new(revision, &request.builder).blocked(
                BlockReason::InvalidRevision {
                    revision: revision.clone(),
                },
            ));
        }
        self.ensure_valid_builder(&request.builder).await?;
        self.trigger_on_revision(session, revision, request).await
    }

    async fn trigger_on_revision(
        &self,
        session: &mut TriggerSession,
        revision: &Revision,
        request: &TriggerRequest,
    ) -> Result<TriggerOutcome> {
        let requested = &request.builder;
        let mut outcome = TriggerOutcome::new(revision, requested);
        let mut times = request.times;
        tracing::info!(
            "===> We want to trigger '{requested}' on revision '{revision}' a total of {times} time(s)"
        );

        let (builder, files) = match &request.files {
            Some(files) => {
                if !self.probe.all_reachable(files).await {
                    tracing::warn!(?files, "Not all of the given files can be reached");
                }
                (requested.clone(), files.clone())
            }
            None => {
                let objective = self
                    .determine_trigger_objective(
                        session,
                        revision,
                        requested,
                        request.trigger_build_if_missing,
                    )
                    .await?;
                if let Some(target) = objective.builder() {
                    if times != 1 && !self.mapper.is_downstream(target).await? {
                        tracing::debug!("A build only needs to run once, not {times} times");
                        if target != requested {
                            tracing::info!(
                                "In order to trigger '{requested}' {times} times, run this again after '{target}' ends"
                            );
                        }
                        times = 1;
                    }
                }
                match objective {
                    TriggerObjective::Requested { builder, files } => (builder, files),
                    TriggerObjective::Upstream { builder } => (builder, vec![]),
                    TriggerObjective::Nothing(reason) => {
                        tracing::debug!("Nothing needs to be triggered");
                        return Ok(outcome.blocked(reason));
                    }
                }
            }
        };
        outcome.triggered = Some(builder.clone());
        let extra = request.extra_properties.as_ref();

        if request.dry_run {
            tracing::info!("Dry-run: we were going to request '{builder}' {times} time(s)");
            let result = self
                .trigger(session, &builder, revision, &files, true, extra)
                .await?;
            outcome.results.push(result);
            return Ok(outcome);
        }

        for _ in 0..times {
            match self
                .trigger(session, &builder, revision, &files, false, extra)
                .await
            {
                Ok(result) => {
                    if !result.is_success() {
                        tracing::warn!(
                            %builder,
                            %revision,
                            status = result.http_status,
                            "Trigger request was not accepted"
                        );
                    }
                    outcome.results.push(result);
                }
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    tracing::warn!(%builder, %revision, error = %e, "Trigger request failed");
                    outcome.failures.push(e.to_string());
                }
            }
        }
        Ok(outcome)
    }

    /// Make sure `request.builder` has `request.times` jobs on every revision.
    ///
    /// Revisions are processed one at a time. A failure on one revision is
    /// reported and the remaining revisions are still processed; configuration
    /// errors reject the whole range.
    pub async fn trigger_range(
        &self,
        session: &mut TriggerSession,
        revisions: &[Revision],
        request: &TriggerRequest,
    ) -> Result<RangeReport> {
        let builder = &request.builder;
        let (repo, repo_url) = self.query_repo_of(builder).await?;
        self.ensure_valid_builder(builder).await?;

        tracing::info!(
            "We want to have {} job(s) of '{builder}' on revisions {revisions:?}",
            request.times
        );
        let mut report = RangeReport {
            builder: builder.clone(),
            times: request.times,
            revisions: Vec::with_capacity(revisions.len()),
        };

        for revision in revisions {
            tracing::info!("=== {revision} ===");
            let action = match self
                .fulfil_revision(session, &repo, &repo_url, revision, request)
                .await
            {
                Ok(action) => action,
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    tracing::warn!(%revision, error = %e, "Could not process revision");
                    RevisionAction::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.revisions.push((revision.clone(), action));
        }

        let failed = report.non_success().count() + report.failures().len();
        if failed > 0 {
            tracing::warn!(failed, "Not all requests succeeded");
        }
        Ok(report)
    }

    async fn fulfil_revision(
        &self,
        session: &mut TriggerSession,
        repo: &RepoName,
        repo_url: &str,
        revision: &Revision,
        request: &TriggerRequest,
    ) -> Result<RevisionAction> {
        let builder = &request.builder;
        if !self.history.is_valid_revision(repo_url, revision).await? {
            tracing::info!(%revision, "We can't trigger anything on pushes without a valid revision");
            return Ok(RevisionAction::InvalidRevision);
        }

        let query = self.query_source();
        let jobs = query.get_matching_jobs(repo, revision, builder).await?;
        let summary = summarize(query, &jobs).await?;
        let potential = summary.potential_jobs();
        tracing::debug!(
            "We found {} pending/running jobs, {} successful jobs and {} failed jobs",
            summary.pending + summary.running,
            summary.successful,
            summary.failed
        );

        let wanted = request.times as usize;
        if potential >= wanted {
            tracing::info!(
                "We have {potential} job(s) for '{builder}' which is enough for the {wanted} job(s) we want"
            );
            return Ok(RevisionAction::Satisfied { potential });
        }

        let deficit = (wanted - potential) as u32;
        tracing::info!(
            "We have found {potential} potential job(s) matching '{builder}' on {revision}, we need to trigger more"
        );

        // An existing job can be retriggered instead of creating a new one.
        if let (Some(first), None) = (jobs.first(), &request.files) {
            let mut count = deficit;
            if !self.mapper.is_downstream(builder).await? {
                if !session.is_unique_build_request(revision, builder, false) {
                    let reason = BlockReason::BuildAlreadyRequested {
                        build: builder.clone(),
                        revision: revision.clone(),
                    };
                    tracing::info!(%builder, %revision, "Not retriggering: {reason}");
                    let outcome = TriggerOutcome::new(revision, builder).blocked(reason);
                    return Ok(RevisionAction::Triggered(outcome));
                }
                count = 1;
                session.record(revision, builder);
            }
            let request_id = query.get_backend_request_id(repo, first).await?;
            let retriggered = self
                .backend
                .retrigger(repo, &request_id, count, request.dry_run)
                .await?;
            if !retriggered.is_success() {
                tracing::warn!(
                    %request_id,
                    failed = retriggered.failed_count(),
                    "Not every retrigger request was accepted"
                );
            }
            return Ok(RevisionAction::Retriggered {
                request_id,
                count,
                results: retriggered.results,
                failures: retriggered.failures,
            });
        }

        let request = request.clone().times(deficit);
        let outcome = self.trigger_on_revision(session, revision, &request).await?;
        Ok(RevisionAction::Triggered(outcome))
    }
}
