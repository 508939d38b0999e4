//! Range scheduling and single-revision triggers.
//!
//! Run with: `cargo test -p retrig-tests --test range_tests`

use pretty_assertions::assert_eq;
use retrig_core::memory::BackendCall;
use retrig_core::{Error, JobStatus, RepoName, RequestId, Revision};
use retrig_scheduler::{
    BackendKind, BlockReason, RevisionAction, TriggerRequest, TriggerSession,
};
use retrig_tests::*;

#[tokio::test]
async fn test_enough_potential_jobs_triggers_nothing() {
    init_test_logging();
    let (ci, engine) = World::inbound()
        .job(MOCHITEST, rev(3), JobStatus::Success)
        .job(MOCHITEST, rev(3), JobStatus::Running)
        .job(MOCHITEST, rev(3), JobStatus::Failure)
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST).times(3))
        .await
        .expect("Failed to trigger range");

    assert!(matches!(
        report.action(&rev(3)),
        Some(RevisionAction::Satisfied { potential: 3 })
    ));
    assert!(ci.calls().await.is_empty());
}

#[tokio::test]
async fn test_coalesced_jobs_do_not_count() {
    let (ci, engine) = World::inbound()
        .job(MOCHITEST, rev(3), JobStatus::Coalesced)
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST).times(2))
        .await
        .expect("Failed to trigger range");

    // The coalesced job is retriggered for the whole deficit.
    assert!(matches!(
        report.action(&rev(3)),
        Some(RevisionAction::Retriggered { count: 2, .. })
    ));
    assert_eq!(retrigger_calls(&ci).await, vec![("100".to_string(), 2)]);
}

#[tokio::test]
async fn test_existing_job_is_retriggered_for_the_deficit() {
    let (ci, engine) = World::inbound()
        .build_with_artifacts(rev(3))
        .job(MOCHITEST, rev(3), JobStatus::Success)
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST).times(3))
        .await
        .expect("Failed to trigger range");

    let Some(RevisionAction::Retriggered {
        request_id, count, ..
    }) = report.action(&rev(3))
    else {
        panic!("expected a retrigger, got {report:?}");
    };
    assert_eq!(request_id, &RequestId::new("101"));
    assert_eq!(*count, 2);
    assert_eq!(retrigger_calls(&ci).await, vec![("101".to_string(), 2)]);
    assert!(triggered_builders(&ci).await.is_empty());
}

#[tokio::test]
async fn test_job_with_unavailable_status_does_not_count() {
    let (ci, engine) = World::inbound()
        .job(MOCHITEST, rev(3), JobStatus::Failure)
        .with_broken_status()
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST))
        .await
        .expect("Failed to trigger range");

    assert!(matches!(
        report.action(&rev(3)),
        Some(RevisionAction::Retriggered { count: 1, .. })
    ));
    assert_eq!(retrigger_calls(&ci).await, vec![("100".to_string(), 1)]);
}

#[tokio::test]
async fn test_new_jobs_get_the_build_artifacts() {
    let (ci, engine) = World::inbound().build_with_artifacts(rev(4)).engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(4)], &TriggerRequest::new(XPCSHELL).times(2))
        .await
        .expect("Failed to trigger range");

    let Some(RevisionAction::Triggered(outcome)) = report.action(&rev(4)) else {
        panic!("expected new triggers, got {report:?}");
    };
    assert_eq!(outcome.triggered, Some(builder(XPCSHELL)));
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.failures.is_empty());

    let calls = ci.calls().await;
    assert_eq!(calls.len(), 2);
    for call in calls {
        let BackendCall::Trigger { files, builder, .. } = call else {
            panic!("expected a trigger call, got {call:?}");
        };
        assert_eq!(builder.as_str(), XPCSHELL);
        assert_eq!(files, vec![package_url(&rev(4)), test_packages_url(&rev(4))]);
    }
}

#[tokio::test]
async fn test_missing_build_is_triggered_once_whatever_the_times() {
    let (ci, engine) = World::inbound().engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(2)], &TriggerRequest::new(TALOS).times(5))
        .await
        .expect("Failed to trigger range");

    let Some(RevisionAction::Triggered(outcome)) = report.action(&rev(2)) else {
        panic!("expected the build to be triggered, got {report:?}");
    };
    assert_eq!(outcome.triggered, Some(builder(BUILD)));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(triggered_builders(&ci).await, vec![BUILD.to_string()]);
    assert!(session.is_recorded(&rev(2), &builder(BUILD)));
}

#[tokio::test]
async fn test_blocked_revision_is_reported() {
    let (ci, engine) = World::inbound()
        .job(BUILD, rev(3), JobStatus::Running)
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST))
        .await
        .expect("Failed to trigger range");

    let Some(RevisionAction::Triggered(outcome)) = report.action(&rev(3)) else {
        panic!("expected a trigger attempt, got {report:?}");
    };
    assert_eq!(outcome.triggered, None);
    assert!(matches!(
        outcome.blocked,
        Some(BlockReason::BuildInFlight { .. })
    ));
    assert!(ci.calls().await.is_empty());
}

#[tokio::test]
async fn test_invalid_revision_is_skipped() {
    let (ci, engine) = World::inbound().build_with_artifacts(rev(1)).engine();
    let mut session = TriggerSession::new();
    let unknown = Revision::parse("bbbbbbbbbbbb").expect("valid revision");

    let report = engine
        .trigger_range(
            &mut session,
            &[unknown.clone(), rev(1)],
            &TriggerRequest::new(MOCHITEST),
        )
        .await
        .expect("Failed to trigger range");

    assert!(matches!(
        report.action(&unknown),
        Some(RevisionAction::InvalidRevision)
    ));
    assert!(matches!(
        report.action(&rev(1)),
        Some(RevisionAction::Triggered(_))
    ));
    assert_eq!(triggered_builders(&ci).await, vec![MOCHITEST.to_string()]);
}

#[tokio::test]
async fn test_revisions_are_processed_in_order() {
    let (ci, engine) = World::inbound()
        .build_with_artifacts(rev(1))
        .build_with_artifacts(rev(2))
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(2), rev(1)], &TriggerRequest::new(MOCHITEST))
        .await
        .expect("Failed to trigger range");

    let order: Vec<Revision> = report.revisions.iter().map(|(r, _)| r.clone()).collect();
    assert_eq!(order, vec![rev(2), rev(1)]);
    let revisions: Vec<Revision> = ci
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::Trigger { revision, .. } => Some(revision),
            _ => None,
        })
        .collect();
    assert_eq!(revisions, vec![rev(2), rev(1)]);
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let (ci, engine) = World::inbound()
        .build_with_artifacts(rev(3))
        .job(MOCHITEST, rev(4), JobStatus::Success)
        .engine();
    let mut session = TriggerSession::new();
    let request = TriggerRequest::new(MOCHITEST).times(3).dry_run(true);

    let report = engine
        .trigger_range(&mut session, &[rev(3), rev(4)], &request)
        .await
        .expect("Failed to trigger range");

    let Some(RevisionAction::Triggered(outcome)) = report.action(&rev(3)) else {
        panic!("expected a simulated trigger, got {report:?}");
    };
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].dry_run);
    let Some(RevisionAction::Retriggered { results, .. }) = report.action(&rev(4)) else {
        panic!("expected a simulated retrigger, got {report:?}");
    };
    assert!(results.iter().all(|r| r.dry_run));
    assert!(ci.calls().await.is_empty());
}

#[tokio::test]
async fn test_rejected_requests_are_reported() {
    let (_, engine) = World::inbound()
        .build_with_artifacts(rev(3))
        .trigger_status(500)
        .engine();
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST).times(2))
        .await
        .expect("Rejected requests do not fail the range");

    assert_eq!(report.non_success().count(), 2);
    assert!(report.failures().is_empty());
}

#[tokio::test]
async fn test_rejected_task_retriggers_are_all_attempted() {
    let (ci, engine) = World::inbound()
        .job(MOCHITEST, rev(3), JobStatus::Success)
        .trigger_status(503)
        .engine_with(BackendKind::TaskCluster);
    let mut session = TriggerSession::new();

    let report = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(MOCHITEST).times(4))
        .await
        .expect("Rejected retriggers do not fail the range");

    let Some(RevisionAction::Retriggered { count, results, .. }) = report.action(&rev(3)) else {
        panic!("expected a retrigger, got {report:?}");
    };
    assert_eq!(*count, 3);
    assert_eq!(results.len(), 3);
    assert_eq!(report.non_success().count(), 3);
    let calls = ci.calls().await;
    assert_eq!(calls.len(), 3);
    assert!(calls
        .iter()
        .all(|call| matches!(call, BackendCall::RetriggerTask { .. })));
}

#[tokio::test]
async fn test_unknown_builder_rejects_the_range() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("builders.txt");
    let (ci, engine) = World::inbound().engine();
    let engine = engine.with_builders_file(&path);
    let mut session = TriggerSession::new();

    let err = engine
        .trigger_range(
            &mut session,
            &[rev(3)],
            &TriggerRequest::new("Linux x86-64 mozilla-inbound debug build"),
        )
        .await
        .expect_err("unknown builder must be rejected");

    assert!(matches!(err, Error::UnknownBuilder(_)));
    assert!(ci.calls().await.is_empty());
    let listing = std::fs::read_to_string(&path).expect("builders file written");
    assert!(listing.lines().any(|line| line == MOCHITEST));
}

#[tokio::test]
async fn test_broken_mapping_rejects_the_range() {
    let (ci, engine) = World::inbound()
        .with_broken_mapping(XPCSHELL, "Linux x86-64 mozilla-inbound asan build")
        .engine();
    let mut session = TriggerSession::new();

    let err = engine
        .trigger_range(&mut session, &[rev(3)], &TriggerRequest::new(XPCSHELL))
        .await
        .expect_err("broken mapping must be rejected");

    assert!(matches!(err, Error::BrokenDependencyMapping { .. }));
    assert!(ci.calls().await.is_empty());
}

#[tokio::test]
async fn test_trigger_job_on_invalid_revision() {
    let (ci, engine) = World::inbound().engine();
    let mut session = TriggerSession::new();
    let unknown = Revision::parse("cccccccccccc").expect("valid revision");

    let outcome = engine
        .trigger_job(&mut session, &unknown, &TriggerRequest::new(BUILD))
        .await
        .expect("Failed to trigger job");

    assert_eq!(
        outcome.blocked,
        Some(BlockReason::InvalidRevision { revision: unknown })
    );
    assert!(ci.calls().await.is_empty());
}

#[tokio::test]
async fn test_trigger_job_with_explicit_files_skips_resolution() {
    let (ci, engine) = World::inbound().engine();
    let mut session = TriggerSession::new();
    let files = vec!["https://archive.example.org/custom/firefox.tar.bz2".to_string()];

    let outcome = engine
        .trigger_job(
            &mut session,
            &rev(3),
            &TriggerRequest::new(MOCHITEST).times(2).files(files.clone()),
        )
        .await
        .expect("Failed to trigger job");

    assert_eq!(outcome.triggered, Some(builder(MOCHITEST)));
    assert_eq!(outcome.results.len(), 2);
    let calls = ci.calls().await;
    assert!(calls.iter().all(|call| matches!(
        call,
        BackendCall::Trigger { files: f, .. } if f == &files
    )));
}

#[tokio::test]
async fn test_trigger_job_with_empty_file_list_resolves_the_build() {
    let (ci, engine) = World::inbound().build_with_artifacts(rev(4)).engine();
    let mut session = TriggerSession::new();

    let outcome = engine
        .trigger_job(
            &mut session,
            &rev(4),
            &TriggerRequest::new(XPCSHELL).files(vec![]),
        )
        .await
        .expect("Failed to trigger job");

    assert_eq!(outcome.triggered, Some(builder(XPCSHELL)));
    let calls = ci.calls().await;
    let [BackendCall::Trigger { files, .. }] = calls.as_slice() else {
        panic!("expected one trigger call, got {calls:?}");
    };
    assert_eq!(files, &vec![package_url(&rev(4)), test_packages_url(&rev(4))]);
}

#[tokio::test]
async fn test_trigger_job_passes_extra_properties() {
    let (ci, engine) = World::inbound().engine();
    let mut session = TriggerSession::new();
    let extra = serde_json::json!({ "who": "sheriff" });

    engine
        .trigger_job(
            &mut session,
            &rev(1),
            &TriggerRequest::new(BUILD).extra_properties(extra.clone()),
        )
        .await
        .expect("Failed to trigger job");

    assert_eq!(
        ci.calls().await,
        vec![BackendCall::Trigger {
            repo: RepoName::new(REPO),
            builder: builder(BUILD),
            revision: rev(1),
            files: vec![],
            extra_properties: Some(extra),
        }]
    );
}

#[tokio::test]
async fn test_bridge_backend_submits_single_task_graphs() {
    let (ci, engine) = World::inbound().engine_with(BackendKind::Bridge);
    let mut session = TriggerSession::new();

    let outcome = engine
        .trigger_job(&mut session, &rev(5), &TriggerRequest::new(BUILD))
        .await
        .expect("Failed to trigger job");

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].is_success());
    assert_eq!(ci.trigger_count(&rev(5), &builder(BUILD)).await, 1);
    assert!(matches!(
        ci.calls().await.as_slice(),
        [BackendCall::TaskGraph { .. }]
    ));
}

#[tokio::test]
async fn test_taskcluster_backend_cannot_trigger_single_builders() {
    let (_, engine) = World::inbound().engine_with(BackendKind::TaskCluster);
    let mut session = TriggerSession::new();

    let outcome = engine
        .trigger_job(&mut session, &rev(5), &TriggerRequest::new(BUILD))
        .await
        .expect("Unsupported requests are reported per request");

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.failures.len(), 1);
}
