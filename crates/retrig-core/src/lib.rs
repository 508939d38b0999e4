//! Retrig Core
//!
//! Domain types, collaborator ports, and error handling for Retrig.
//! This crate defines the shared vocabulary (jobs, revisions, builders,
//! trigger results) used by the trigger-decision engine and its adapters.

pub mod error;
pub mod ids;
pub mod job;
pub mod memory;
pub mod ports;
pub mod task;

pub use error::{Error, QueryError, Result};
pub use ids::*;
pub use job::{Job, JobStatus, TriggerResult};
