//! Backfill window finder.

use crate::engine::TriggerEngine;
use crate::summary::{StatusSummary, summarize};
use retrig_core::{BuilderName, Result, Revision};

/// What counts as "this revision already has the job".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillMode {
    /// Any pending, running, successful or failed job. Coalesced jobs do not count.
    AnyStatus,
    /// Only a successful job.
    SuccessfulOnly,
}

impl BackfillMode {
    pub fn is_covered(&self, summary: &StatusSummary) -> bool {
        match self {
            BackfillMode::AnyStatus => summary.potential_jobs() > 0,
            BackfillMode::SuccessfulOnly => summary.successful > 0,
        }
    }
}

impl TriggerEngine {
    /// Keep the revisions (newest first) that come before the last known job
    /// for `builder`. Without any known job, every revision is kept.
    pub async fn filter_backfill_revlist(
        &self,
        builder: &BuilderName,
        revisions: &[Revision],
        mode: BackfillMode,
    ) -> Result<Vec<Revision>> {
        let (Some(newest), Some(oldest)) = (revisions.first(), revisions.last()) else {
            return Ok(vec![]);
        };
        let repo = self.mapper.repo_name_for(builder).await?;
        let query = self.query_source();
        tracing::info!(%builder, "We want to find a job in this range: [{newest}:{oldest}]");

        let mut window = Vec::new();
        for revision in revisions {
            let jobs = query.get_matching_jobs(&repo, revision, builder).await?;
            let summary = summarize(query, &jobs).await?;
            if mode.is_covered(&summary) {
                tracing::info!(%builder, %revision, ?mode, "Found the last known job");
                break;
            }
            window.push(revision.clone());
        }

        tracing::info!(?window, "We only need to backfill these revisions");
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrig_core::JobStatus;

    #[test]
    fn test_coalesced_only_is_not_covered() {
        let summary = StatusSummary::from_statuses([JobStatus::Coalesced]);
        assert!(!BackfillMode::AnyStatus.is_covered(&summary));
        assert!(!BackfillMode::SuccessfulOnly.is_covered(&summary));
    }

    #[test]
    fn test_failed_job_covers_only_any_status() {
        let summary = StatusSummary::from_statuses([JobStatus::Failure]);
        assert!(BackfillMode::AnyStatus.is_covered(&summary));
        assert!(!BackfillMode::SuccessfulOnly.is_covered(&summary));
    }

    #[test]
    fn test_success_covers_both_modes() {
        let summary = StatusSummary::from_statuses([JobStatus::Success]);
        assert!(BackfillMode::AnyStatus.is_covered(&summary));
        assert!(BackfillMode::SuccessfulOnly.is_covered(&summary));
    }
}
