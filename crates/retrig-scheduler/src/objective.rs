//! Trigger objective resolution.
//!
//! Asking for a test builder on a revision only makes sense once its build has
//! produced artifacts. Resolution scans the build jobs of the revision once,
//! producing a [`BuildScan`], then [`decide`] maps the scan to a
//! [`TriggerObjective`].

use crate::engine::TriggerEngine;
use crate::ledger::TriggerSession;
use retrig_core::job::{PACKAGE_URL, TEST_PACKAGES_URL, TESTS_URL};
use retrig_core::{BuilderName, Error, Job, QueryError, RequestId, Result, Revision};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Why the artifacts of a build job cannot be used.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("job {0} has no recorded properties")]
    MissingProperties(RequestId),
    #[error("job {0} did not upload a package or tests archive")]
    NoFiles(RequestId),
    #[error("properties of job {request_id} unavailable: {source}")]
    Unavailable {
        request_id: RequestId,
        source: QueryError,
    },
}

/// Find the files a test job needs from the properties of its build job:
/// the package URL, and the test packages URL or else the legacy tests URL.
pub fn extract_artifacts(
    request_id: &RequestId,
    properties: Option<&BTreeMap<String, String>>,
) -> std::result::Result<Vec<String>, ArtifactError> {
    let properties =
        properties.ok_or_else(|| ArtifactError::MissingProperties(request_id.clone()))?;

    let mut files = Vec::new();
    if let Some(url) = properties.get(PACKAGE_URL) {
        files.push(url.clone());
    }
    if let Some(url) = properties
        .get(TEST_PACKAGES_URL)
        .or_else(|| properties.get(TESTS_URL))
    {
        files.push(url.clone());
    }

    if files.is_empty() {
        return Err(ArtifactError::NoFiles(request_id.clone()));
    }
    Ok(files)
}

/// Result of scanning the build jobs of a revision.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildScan {
    /// A build whose artifacts exist and can be downloaded.
    Working { job: Job, files: Vec<String> },
    /// A build that is still pending or running.
    InFlight(Job),
    /// A finished build without usable artifacts.
    Failed(Job),
    /// No build job at all.
    Absent,
}

/// Why nothing should be triggered now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    InvalidRevision { revision: Revision },
    BuildInFlight { build: BuilderName, revision: Revision },
    BuildFailed { build: BuilderName, revision: Revision },
    BuildMissing { build: BuilderName, revision: Revision },
    BuildAlreadyRequested { build: BuilderName, revision: Revision },
}

impl BlockReason {
    /// Trying again later may succeed without any other intervention.
    pub fn is_retry_later(&self) -> bool {
        matches!(
            self,
            BlockReason::BuildInFlight { .. } | BlockReason::BuildAlreadyRequested { .. }
        )
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::InvalidRevision { revision } => {
                write!(f, "revision {revision} is not a valid push")
            }
            BlockReason::BuildInFlight { build, revision } => {
                write!(f, "build '{build}' is still pending or running on {revision}")
            }
            BlockReason::BuildFailed { build, revision } => write!(
                f,
                "build '{build}' finished on {revision} without usable artifacts"
            ),
            BlockReason::BuildMissing { build, revision } => write!(
                f,
                "build '{build}' is missing on {revision} and triggering it was not allowed"
            ),
            BlockReason::BuildAlreadyRequested { build, revision } => write!(
                f,
                "build '{build}' was already requested on {revision} during this session"
            ),
        }
    }
}

/// What to trigger to satisfy a request for a builder on a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "objective", rename_all = "snake_case")]
pub enum TriggerObjective {
    /// Trigger the requested builder, passing the artifacts of its build.
    Requested {
        builder: BuilderName,
        files: Vec<String>,
    },
    /// Trigger the upstream build first; the requested builder needs another pass.
    Upstream { builder: BuilderName },
    Nothing(BlockReason),
}

impl TriggerObjective {
    pub fn builder(&self) -> Option<&BuilderName> {
        match self {
            TriggerObjective::Requested { builder, .. } | TriggerObjective::Upstream { builder } => {
                Some(builder)
            }
            TriggerObjective::Nothing(_) => None,
        }
    }
}

/// Map a build scan to an objective.
///
/// Precedence: working build, then in-flight build, then failed build. With no
/// build at all the build itself is triggered, unless that was disallowed or
/// already done during this session.
pub fn decide(
    requested: &BuilderName,
    build: &BuilderName,
    revision: &Revision,
    scan: BuildScan,
    trigger_build_if_missing: bool,
    unique_build_request: bool,
) -> TriggerObjective {
    let blocked = |reason: fn(BuilderName, Revision) -> BlockReason| {
        TriggerObjective::Nothing(reason(build.clone(), revision.clone()))
    };
    match scan {
        BuildScan::Working { files, .. } => TriggerObjective::Requested {
            builder: requested.clone(),
            files,
        },
        BuildScan::InFlight(_) => {
            blocked(|build, revision| BlockReason::BuildInFlight { build, revision })
        }
        BuildScan::Failed(_) => blocked(|build, revision| BlockReason::BuildFailed { build, revision }),
        BuildScan::Absent if !trigger_build_if_missing => {
            blocked(|build, revision| BlockReason::BuildMissing { build, revision })
        }
        BuildScan::Absent if !unique_build_request => {
            blocked(|build, revision| BlockReason::BuildAlreadyRequested { build, revision })
        }
        BuildScan::Absent => TriggerObjective::Upstream {
            builder: build.clone(),
        },
    }
}

impl TriggerEngine {
    /// Determine which builder to trigger, and with which files, to get
    /// `builder` running on `revision`.
    pub async fn determine_trigger_objective(
        &self,
        session: &TriggerSession,
        revision: &Revision,
        builder: &BuilderName,
        trigger_build_if_missing: bool,
    ) -> Result<TriggerObjective> {
        let repo = self.mapper.repo_name_for(builder).await?;
        let build = self.mapper.upstream_build_builder(builder).await?;

        if !self.valid_builder(&build).await? {
            return Err(Error::BrokenDependencyMapping {
                builder: builder.to_string(),
                upstream: build.to_string(),
            });
        }

        if &build == builder {
            // A build needs no files, and it is what we want to trigger.
            if !session.is_unique_build_request(revision, &build, false) {
                let reason = BlockReason::BuildAlreadyRequested {
                    build,
                    revision: revision.clone(),
                };
                tracing::info!(%builder, %revision, "Not triggering: {reason}");
                return Ok(TriggerObjective::Nothing(reason));
            }
            return Ok(TriggerObjective::Requested {
                builder: build,
                files: vec![],
            });
        }

        let jobs = self
            .build_source
            .get_matching_jobs(&repo, revision, &build)
            .await?;
        tracing::debug!(%build, %revision, count = jobs.len(), "Matching build jobs");

        let scan = self.scan_build_jobs(&jobs).await?;
        let unique = session.is_unique_build_request(revision, &build, false);
        let objective = decide(
            builder,
            &build,
            revision,
            scan,
            trigger_build_if_missing,
            unique,
        );

        match &objective {
            TriggerObjective::Requested { .. } => {
                tracing::info!(%builder, "We have the files needed to trigger the test job")
            }
            TriggerObjective::Upstream { builder: build } => {
                tracing::info!("We will trigger 1) '{build}' instead of 2) '{builder}'");
                if repo.as_str() == "try" {
                    tracing::info!("Run this again after (1) is done to trigger (2)");
                } else {
                    tracing::info!("After (1) is done every test job depending on it will run");
                }
            }
            TriggerObjective::Nothing(reason) => {
                tracing::info!(%builder, %revision, "Not triggering: {reason}");
                if reason.is_retry_later() {
                    tracing::info!("Run this again after '{build}' finishes to trigger '{builder}'");
                }
            }
        }
        Ok(objective)
    }

    /// Scan build jobs in order.
    ///
    /// The first in-flight build ends the scan, as does the first build with
    /// reachable artifacts. Jobs whose status the backend cannot report are skipped.
    pub async fn scan_build_jobs(&self, jobs: &[Job]) -> Result<BuildScan> {
        let mut failed = None;

        for job in jobs {
            let status = match self.build_source.get_job_status(job).await {
                Ok(status) => status,
                Err(QueryError::StatusUnavailable { request_id }) => {
                    tracing::debug!(
                        %request_id,
                        "Status unavailable for build job, treating its files as unreachable"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if status.is_in_flight() {
                tracing::debug!(request_id = %job.request_id, "Found a running/pending build job");
                return Ok(BuildScan::InFlight(job.clone()));
            }

            match self.find_files(job).await {
                Ok(files) if self.probe.all_reachable(&files).await => {
                    return Ok(BuildScan::Working {
                        job: job.clone(),
                        files,
                    });
                }
                Ok(files) => tracing::debug!(?files, "Can't reach the files of this build"),
                Err(e) => tracing::debug!(error = %e, "Can't determine the files of this build"),
            }

            tracing::info!(
                request_id = %job.request_id,
                ?status,
                "Found a finished build job that did not produce usable files"
            );
            failed.get_or_insert_with(|| job.clone());
        }

        Ok(failed.map_or(BuildScan::Absent, BuildScan::Failed))
    }

    async fn find_files(&self, job: &Job) -> std::result::Result<Vec<String>, ArtifactError> {
        let properties = self
            .build_source
            .get_job_properties(job)
            .await
            .map_err(|source| ArtifactError::Unavailable {
                request_id: job.request_id.clone(),
                source,
            })?;
        extract_artifacts(&job.request_id, properties.as_ref())
    }
}
