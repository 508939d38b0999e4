//! Strongly-typed identifiers for domain entities.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of the revision identifiers handled by the engine.
pub const REVISION_LEN: usize = 12;

macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

define_name!(
    /// A configured job definition, e.g. `Linux x86-64 mozilla-inbound build`.
    BuilderName
);
define_name!(
    /// Short repository name, e.g. `mozilla-inbound` or `try`.
    RepoName
);
define_name!(
    /// Backend-specific identifier of a scheduled request (build request id or task id).
    RequestId
);

/// Identifier of one push on a repository.
///
/// Revisions are normalized to the first [`REVISION_LEN`] lowercase hex digits
/// so that short and full hashes compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.len() < REVISION_LEN || s.len() > 40 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidRevision(s.to_string()));
        }
        Ok(Self(s[..REVISION_LEN].to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this value is a well-formed revision.
    ///
    /// Values deserialized from snapshots bypass [`Revision::parse`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == REVISION_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of a task inside a generated task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task_{}", self.0.simple())
    }
}

impl From<TaskId> for RequestId {
    fn from(id: TaskId) -> Self {
        RequestId::new(id.to_string())
    }
}
