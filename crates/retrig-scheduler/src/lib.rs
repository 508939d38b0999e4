//! Trigger-decision engine for Retrig.
//!
//! Decides what to trigger on a CI for a builder and a set of revisions: the
//! builder itself or its missing upstream build, how many more runs are needed,
//! and which historical revisions still lack the job.

pub mod backend;
pub mod backfill;
pub mod batch;
pub mod engine;
pub mod graph;
pub mod ledger;
pub mod objective;
pub mod range;
pub mod summary;

pub use backend::{BackendKind, RetriggerOutcome, SchedulingBackend};
pub use backfill::BackfillMode;
pub use engine::{QuerySourceKind, TriggerEngine};
pub use graph::BuildersGraph;
pub use ledger::TriggerSession;
pub use objective::{BlockReason, BuildScan, TriggerObjective};
pub use range::{RangeReport, RevisionAction, TriggerOutcome, TriggerRequest};
pub use summary::StatusSummary;
