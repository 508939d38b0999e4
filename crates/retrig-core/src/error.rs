//! Error types for Retrig.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("Unknown builder: {0}")]
    UnknownBuilder(String),

    #[error("Broken dependency mapping: {builder} maps to unknown build builder {upstream}")]
    BrokenDependencyMapping { builder: String, upstream: String },

    #[error("Unknown repository: {0}")]
    UnknownRepository(String),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Invalid builders graph: {0}")]
    InvalidGraph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Backend errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation not supported by {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Configuration errors reject a whole request and must never be swallowed
    /// by batch processing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownBuilder(_)
                | Error::BrokenDependencyMapping { .. }
                | Error::UnknownRepository(_)
                | Error::InvalidRevision(_)
                | Error::InvalidGraph(_)
                | Error::Config(_)
        )
    }
}

/// Failure while fetching data for a single job from a query source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The backend has no status data for a request it reported as a job.
    /// Known defect of the build-status backend; callers skip the job.
    #[error("status data unavailable for request {request_id}")]
    StatusUnavailable { request_id: String },

    #[error("{0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_flagged() {
        assert!(Error::UnknownBuilder("b".into()).is_configuration());
        assert!(
            Error::BrokenDependencyMapping {
                builder: "t".into(),
                upstream: "b".into()
            }
            .is_configuration()
        );
        assert!(!Error::Backend("503".into()).is_configuration());
        assert!(
            !Error::Query(QueryError::StatusUnavailable {
                request_id: "1".into()
            })
            .is_configuration()
        );
    }
}
