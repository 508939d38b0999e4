//! Test fixtures for creating sample CI worlds.

use retrig_core::job::{PACKAGE_URL, TEST_PACKAGES_URL};
use retrig_core::memory::{BuilderEntry, MemoryCi, RepositoryEntry, Snapshot};
use retrig_core::{BuilderName, Job, JobStatus, RepoName, RequestId, Revision};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const REPO: &str = "mozilla-inbound";
pub const REPO_URL: &str = "https://hg.example.org/integration/mozilla-inbound";

pub const BUILD: &str = "Linux x86-64 mozilla-inbound build";
pub const PGO_BUILD: &str = "Linux x86-64 mozilla-inbound pgo-build";
pub const MOCHITEST: &str = "Ubuntu VM 12.04 x64 mozilla-inbound opt test mochitest-1";
pub const XPCSHELL: &str = "Ubuntu VM 12.04 x64 mozilla-inbound opt test xpcshell";
pub const TALOS: &str = "Ubuntu HW 12.04 x64 mozilla-inbound talos chromez";
pub const PGO_TALOS: &str = "Ubuntu HW 12.04 x64 mozilla-inbound pgo talos chromez";
pub const HG_BUNDLE: &str = "Linux mozilla-inbound hg bundle";

/// Number of pushes in the fixture repository.
pub const PUSHES: u8 = 5;

/// The `n`th push of the fixture repository, 1 being the oldest.
pub fn rev(n: u8) -> Revision {
    Revision::parse(&format!("aaaaaaaaaaa{n:x}")).expect("fixture revision")
}

pub fn builder(name: &str) -> BuilderName {
    BuilderName::new(name)
}

pub fn package_url(revision: &Revision) -> String {
    format!("https://archive.example.org/{revision}/firefox.tar.bz2")
}

pub fn test_packages_url(revision: &Revision) -> String {
    format!("https://archive.example.org/{revision}/test_packages.json")
}

/// Builder for sample CI worlds.
#[derive(Debug, Clone)]
pub struct World {
    snapshot: Snapshot,
}

impl World {
    /// One repository with [`PUSHES`] pushes, a build, its test builders,
    /// a PGO build with its talos builder and an hg bundle builder. No jobs.
    pub fn inbound() -> Self {
        let entry = |name: &str, upstream: Option<&str>| BuilderEntry {
            name: builder(name),
            upstream: upstream.map(builder),
            repo: None,
        };
        Self {
            snapshot: Snapshot {
                repositories: vec![RepositoryEntry {
                    name: RepoName::new(REPO),
                    url: REPO_URL.to_string(),
                    pushes: (1..=PUSHES).map(rev).collect(),
                }],
                builders: vec![
                    entry(BUILD, None),
                    entry(MOCHITEST, Some(BUILD)),
                    entry(XPCSHELL, Some(BUILD)),
                    entry(TALOS, Some(BUILD)),
                    entry(PGO_BUILD, None),
                    entry(PGO_TALOS, Some(PGO_BUILD)),
                    entry(HG_BUNDLE, None),
                ],
                ..Snapshot::default()
            },
        }
    }

    /// Add a job without recorded properties.
    pub fn job(mut self, name: &str, revision: Revision, status: JobStatus) -> Self {
        self.push_job(name, revision, status, None);
        self
    }

    /// Add a finished build job whose artifacts can be downloaded.
    pub fn build_with_artifacts(mut self, revision: Revision) -> Self {
        let properties = Self::artifact_properties(&revision);
        self.snapshot
            .reachable_urls
            .extend(properties.values().cloned());
        self.push_job(BUILD, revision, JobStatus::Success, Some(properties));
        self
    }

    /// Add a finished build job whose artifacts were recorded but are gone.
    pub fn build_with_expired_artifacts(mut self, revision: Revision) -> Self {
        let properties = Self::artifact_properties(&revision);
        self.push_job(BUILD, revision, JobStatus::Success, Some(properties));
        self
    }

    /// Make status lookups of the most recently added job fail.
    pub fn with_broken_status(mut self) -> Self {
        if let Some(job) = self.snapshot.jobs.last() {
            let id = job.request_id.clone();
            self.snapshot.broken_status.insert(id);
        }
        self
    }

    /// Let the name of `test` map to a build builder the catalog does not know.
    pub fn with_broken_mapping(mut self, test: &str, upstream: &str) -> Self {
        if let Some(entry) = self
            .snapshot
            .builders
            .iter_mut()
            .find(|b| b.name.as_str() == test)
        {
            entry.upstream = Some(builder(upstream));
        }
        self
    }

    /// List the build builders after the builders that depend on them.
    pub fn with_builds_listed_last(mut self) -> Self {
        self.snapshot.builders.sort_by_key(|b| b.upstream.is_none());
        self
    }

    pub fn trigger_status(mut self, status: u16) -> Self {
        self.snapshot.trigger_status = status;
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn into_ci(self) -> Arc<MemoryCi> {
        Arc::new(MemoryCi::new(self.snapshot))
    }

    fn push_job(
        &mut self,
        name: &str,
        revision: Revision,
        status: JobStatus,
        properties: Option<BTreeMap<String, String>>,
    ) {
        let request_id = RequestId::new(format!("{}", 100 + self.snapshot.jobs.len()));
        self.snapshot.jobs.push(Job {
            builder: builder(name),
            revision,
            status,
            request_id,
            properties,
            completed_at: None,
        });
    }

    fn artifact_properties(revision: &Revision) -> BTreeMap<String, String> {
        BTreeMap::from([
            (PACKAGE_URL.to_string(), package_url(revision)),
            (TEST_PACKAGES_URL.to_string(), test_packages_url(revision)),
        ])
    }
}
