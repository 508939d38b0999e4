//! Test helper functions and utilities.

use crate::fixtures::World;
use retrig_core::memory::{BackendCall, MemoryCi};
use retrig_scheduler::{BackendKind, TriggerEngine};
use std::sync::Arc;

impl World {
    /// Build the world and an engine using the build API backend.
    pub fn engine(self) -> (Arc<MemoryCi>, TriggerEngine) {
        self.engine_with(BackendKind::BuildApi)
    }

    pub fn engine_with(self, backend: BackendKind) -> (Arc<MemoryCi>, TriggerEngine) {
        let ci = self.into_ci();
        let engine = TriggerEngine::from_world(ci.clone(), backend);
        (ci, engine)
    }
}

/// Retrigger calls recorded by `ci`, as (request id, count).
pub async fn retrigger_calls(ci: &MemoryCi) -> Vec<(String, u32)> {
    ci.calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::Retrigger {
                request_id, count, ..
            } => Some((request_id.to_string(), count)),
            _ => None,
        })
        .collect()
}

/// Builders of the trigger calls recorded by `ci`, in call order.
pub async fn triggered_builders(ci: &MemoryCi) -> Vec<String> {
    ci.calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::Trigger { builder, .. } => Some(builder.to_string()),
            _ => None,
        })
        .collect()
}
