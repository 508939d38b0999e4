//! Session dedup ledger.

use retrig_core::{BuilderName, Revision};
use std::collections::{BTreeSet, HashMap};

/// Build builders triggered per revision during one run.
///
/// The ledger only grows. Pass one session to every resolver and scheduler
/// call of a run; use separate sessions for independent runs.
#[derive(Debug, Default, Clone)]
pub struct TriggerSession {
    triggered: HashMap<Revision, BTreeSet<BuilderName>>,
}

impl TriggerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, revision: &Revision, builder: &BuilderName) {
        tracing::debug!(%revision, %builder, "Recording triggered builder");
        self.triggered
            .entry(revision.clone())
            .or_default()
            .insert(builder.clone());
    }

    pub fn is_recorded(&self, revision: &Revision, builder: &BuilderName) -> bool {
        self.triggered
            .get(revision)
            .is_some_and(|builders| builders.contains(builder))
    }

    /// Whether a trigger request for `builder` may be issued. Downstream (test)
    /// builders are always allowed; a build builder at most once per revision.
    pub fn is_unique_build_request(
        &self,
        revision: &Revision,
        builder: &BuilderName,
        downstream: bool,
    ) -> bool {
        if downstream {
            return true;
        }
        if self.is_recorded(revision, builder) {
            tracing::debug!(
                %revision,
                %builder,
                "Build already requested during this session, not requesting it again"
            );
            return false;
        }
        true
    }

    pub fn triggered_on(&self, revision: &Revision) -> impl Iterator<Item = &BuilderName> {
        self.triggered.get(revision).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev() -> Revision {
        Revision::parse("0123456789ab").unwrap()
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut session = TriggerSession::new();
        let build = BuilderName::new("Linux try build");
        session.record(&rev(), &build);
        session.record(&rev(), &build);
        assert!(session.is_recorded(&rev(), &build));
        assert_eq!(session.triggered_on(&rev()).count(), 1);
    }

    #[test]
    fn test_build_requests_are_unique_per_revision() {
        let mut session = TriggerSession::new();
        let build = BuilderName::new("Linux try build");
        assert!(session.is_unique_build_request(&rev(), &build, false));
        session.record(&rev(), &build);
        assert!(!session.is_unique_build_request(&rev(), &build, false));

        let other = Revision::parse("ba9876543210").unwrap();
        assert!(session.is_unique_build_request(&other, &build, false));
    }

    #[test]
    fn test_downstream_builders_are_exempt() {
        let mut session = TriggerSession::new();
        let test = BuilderName::new("Ubuntu try opt test mochitest-1");
        session.record(&rev(), &test);
        assert!(session.is_unique_build_request(&rev(), &test, true));
    }
}
