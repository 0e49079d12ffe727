//! Reconciler behavior: condition gates, deletion cleanup, error recording
//! and persistence.

use jenkins_sync_operator::controller::reconciler::{ReconcileAction, reconcile, run_worker};
use jenkins_sync_operator::crd::{
    RESOURCE_TYPE, ReconcileKey, condition_status, conditions, reasons,
};
use jenkins_sync_operator::jenkins::JobSyncError;
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures::*;

fn key() -> ReconcileKey {
    ReconcileKey::new("team-a", "build")
}

fn synced_condition_of(
    pc: &jenkins_sync_operator::crd::PipelineConfig,
) -> Option<jenkins_sync_operator::crd::Condition> {
    pc.status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == conditions::SYNCED))
        .cloned()
}

#[tokio::test]
async fn test_uninitialized_resource_is_skipped() {
    let pc = with_synced(pipeline_config("team-a", "build"), condition_status::FALSE);
    let h = harness(RecordingJobSync::new(), vec![pc]);

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    assert_eq!(h.job_sync.calls(), (0, 0, 0));
    assert!(h.api.updates().is_empty());
}

#[tokio::test]
async fn test_missing_synced_condition_is_skipped() {
    // Initialized, template-derived with no dependencies, but the upstream
    // initializer has not created Synced yet: nothing is written, nothing
    // is queued again.
    let pc = with_template_plugins(initialized(pipeline_config("team-a", "build")), vec![]);
    let h = harness(RecordingJobSync::new(), vec![pc]);

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    assert_eq!(h.job_sync.calls(), (0, 0, 0));
    assert!(h.api.updates().is_empty());
}

#[tokio::test]
async fn test_already_synced_is_idempotent_noop() {
    let pc = with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::TRUE,
    );
    let h = harness(RecordingJobSync::new(), vec![pc]);

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    // No collaborator call occurs for an already-converged resource.
    assert_eq!(h.job_sync.calls(), (0, 0, 0));
    assert!(h.api.updates().is_empty());
}

#[tokio::test]
async fn test_deleted_resource_triggers_job_deletion_without_status_write() {
    // Nothing seeded: the key is absent from the local index.
    let h = harness(RecordingJobSync::new(), vec![]);

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    let (has_synced, upsert, delete) = h.job_sync.calls();
    assert_eq!((has_synced, upsert), (0, 0));
    assert_eq!(delete, 1);
    assert!(h.api.updates().is_empty());
}

#[tokio::test]
async fn test_deleted_resource_with_absent_job_does_not_fail() {
    let h = harness(RecordingJobSync::new().delete(FakeOutcome::Ok(false)), vec![]);

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
}

#[tokio::test]
async fn test_deleted_resource_with_io_error_requests_requeue() {
    let h = harness(
        RecordingJobSync::new().delete(FakeOutcome::Io("jenkins unreachable".to_string())),
        vec![],
    );

    let err = reconcile(&key(), &h.ctx).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(h.api.updates().is_empty());
}

#[tokio::test]
async fn test_successful_sync_persists_synced_true() {
    let pc = with_jenkinsfile(with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    ));
    let h = harness(RecordingJobSync::new(), vec![pc]);

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    let updates = h.api.updates();
    assert_eq!(updates.len(), 1);

    let synced = synced_condition_of(&updates[0]).unwrap();
    assert_eq!(synced.status, condition_status::TRUE);
    assert!(synced.last_attempt.is_some());

    // Heartbeat was recorded for liveness probing.
    assert!(h.health.last_event_time(RESOURCE_TYPE).is_some());
}

#[tokio::test]
async fn test_existing_synced_job_skips_upsert() {
    let pc = with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    );
    let h = harness(
        RecordingJobSync::new().has_synced(FakeOutcome::Ok(true)),
        vec![pc],
    );

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    let (has_synced, upsert, _) = h.job_sync.calls();
    assert_eq!(has_synced, 1);
    assert_eq!(upsert, 0);
    // The optimistic Synced=True still persists.
    assert_eq!(h.api.updates().len(), 1);
}

#[tokio::test]
async fn test_conversion_error_records_condition_without_requeue() {
    let pc = with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    );
    let h = harness(
        RecordingJobSync::new()
            .upsert(FakeOutcome::Conversion("no jenkinsfile in strategy".to_string())),
        vec![pc],
    );

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    // Recorded, not retried at this layer.
    assert_eq!(action, ReconcileAction::Done);
    let updates = h.api.updates();
    assert_eq!(updates.len(), 1);

    let synced = synced_condition_of(&updates[0]).unwrap();
    assert_eq!(synced.status, condition_status::FALSE);
    assert_eq!(synced.reason, reasons::CREATE_JOB_FAILED);
    assert!(synced.message.contains("no jenkinsfile in strategy"));
}

#[tokio::test]
async fn test_io_error_records_condition_and_requeues() {
    let pc = with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    );
    let h = harness(
        RecordingJobSync::new().upsert(FakeOutcome::Io("connection reset".to_string())),
        vec![pc],
    );

    let action = reconcile(&key(), &h.ctx).await.unwrap();

    assert_eq!(action, ReconcileAction::Requeue);
    let updates = h.api.updates();
    assert_eq!(updates.len(), 1);

    let synced = synced_condition_of(&updates[0]).unwrap();
    assert_eq!(synced.status, condition_status::FALSE);
    assert_eq!(synced.reason, reasons::CREATE_JOB_FAILED);
}

#[tokio::test]
async fn test_update_conflict_surfaces_as_retryable_failure() {
    let pc = with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    );
    let h = harness(RecordingJobSync::new(), vec![pc]);
    // The authoritative object moved on while we were holding the copy.
    h.api.set_version(&key(), "2");

    let err = reconcile(&key(), &h.ctx).await.unwrap_err();

    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert!(h.api.updates().is_empty());
}

#[tokio::test]
async fn test_worker_requeues_conflicts_with_growing_backoff() {
    let pc = with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    );
    let h = harness(RecordingJobSync::new(), vec![pc]);
    h.api.set_version(&key(), "2");

    let before = h.queue.next_delay(&key());
    for _ in 0..3 {
        assert!(reconcile(&key(), &h.ctx).await.is_err());
        h.queue.add_rate_limited(key());
    }
    let after = h.queue.next_delay(&key());

    assert!(after > before);
    assert!(after > Duration::ZERO);

    // Success resets the backoff.
    h.queue.forget(&key());
    assert_eq!(h.queue.next_delay(&key()), before);
}

#[tokio::test]
async fn test_worker_loop_processes_key_end_to_end() {
    let pc = with_jenkinsfile(with_synced(
        initialized(pipeline_config("team-a", "build")),
        condition_status::FALSE,
    ));
    let h = harness(RecordingJobSync::new(), vec![pc]);

    h.queue.add(key());
    let worker = tokio::spawn(run_worker(0, Arc::clone(&h.queue), Arc::clone(&h.ctx)));

    // Wait until the status write lands.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.api.updates().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "worker never persisted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.queue.shut_down();
    worker.await.unwrap();

    assert_eq!(h.api.updates().len(), 1);
    assert_eq!(h.queue.num_requeues(&key()), 0);
}

#[tokio::test]
async fn test_io_errors_map_retryable_conversion_does_not() {
    assert!(JobSyncError::Io("x".to_string()).is_retryable());
    assert!(!JobSyncError::Conversion("x".to_string()).is_retryable());
}
