//! Job status aggregation.

use retrig_core::ports::QuerySource;
use retrig_core::{Job, JobStatus, QueryError, Result};
use serde::Serialize;

/// Counts of jobs per outcome for one (repository, revision, builder).
///
/// Every job lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub successful: usize,
    pub pending: usize,
    pub running: usize,
    pub coalesced: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn from_statuses(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            summary.add(status);
        }
        summary
    }

    fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running | JobStatus::Unknown => self.running += 1,
            JobStatus::Success => self.successful += 1,
            JobStatus::Coalesced => self.coalesced += 1,
            status if status.is_failed() => self.failed += 1,
            _ => {}
        }
    }

    /// Jobs that count toward a requested number of runs. Coalesced jobs were
    /// merged into another request and do not.
    pub fn potential_jobs(&self) -> usize {
        self.pending + self.running + self.successful + self.failed
    }

    pub fn total(&self) -> usize {
        self.potential_jobs() + self.coalesced
    }
}

/// Summarize `jobs`, fetching each status from `query`.
///
/// Jobs whose status the backend cannot report are left out of every bucket.
pub async fn summarize(query: &dyn QuerySource, jobs: &[Job]) -> Result<StatusSummary> {
    let mut summary = StatusSummary::default();
    for job in jobs {
        let status = match query.get_job_status(job).await {
            Ok(status) => status,
            Err(QueryError::StatusUnavailable { request_id }) => {
                tracing::debug!(%request_id, "Status unavailable, skipping job");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        summary.add(status);
    }
    Ok(summary)
}
