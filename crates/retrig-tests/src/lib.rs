//! Integration test infrastructure for Retrig.
//!
//! Tests build an in-memory CI world with [`World`], wire a
//! [`TriggerEngine`](retrig_scheduler::TriggerEngine) to it and inspect the
//! backend calls it recorded.
//!
//! # Usage
//!
//! ```ignore
//! use retrig_tests::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (ci, engine) = World::inbound().build_with_artifacts(rev(3)).engine();
//!     // Drive the engine, then look at ci.calls().await
//! }
//! ```

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,retrig_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
