//! Job and trigger result types.

use crate::ids::{BuilderName, RequestId, Revision};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Build property holding the installer package URL.
pub const PACKAGE_URL: &str = "packageUrl";
/// Build property holding the test packages manifest URL. Preferred over [`TESTS_URL`].
pub const TEST_PACKAGES_URL: &str = "testPackagesUrl";
/// Legacy build property holding the tests archive URL.
pub const TESTS_URL: &str = "testsUrl";

/// An attempted or completed execution of a builder on a revision.
///
/// Status transitions are owned by the CI backend; the engine only observes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub builder: BuilderName,
    pub revision: Revision,
    pub status: JobStatus,
    pub request_id: RequestId,
    /// Properties recorded by the backend when the job finished.
    #[serde(default)]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Unknown,
    Success,
    Warning,
    Failure,
    Exception,
    Retry,
    Coalesced,
}

impl JobStatus {
    /// Pending or running. Running jobs sometimes report `unknown`.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running | JobStatus::Unknown)
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            JobStatus::Failure | JobStatus::Warning | JobStatus::Exception | JobStatus::Retry
        )
    }
}

/// Response of the scheduling backend to a trigger or retrigger request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub request_id: Option<RequestId>,
    pub http_status: u16,
    /// No backend call was made; the request was only logged.
    #[serde(default)]
    pub dry_run: bool,
}

impl TriggerResult {
    pub fn accepted(request_id: RequestId, http_status: u16) -> Self {
        Self {
            request_id: Some(request_id),
            http_status,
            dry_run: false,
        }
    }

    pub fn simulated() -> Self {
        Self {
            request_id: None,
            http_status: 0,
            dry_run: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.dry_run || (200..300).contains(&self.http_status)
    }
}
