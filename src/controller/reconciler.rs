//! Reconciliation loop for PipelineConfig.
//!
//! Given a key, loads current state from the local index, evaluates the
//! condition gates, drives the Jenkins job into sync and writes the outcome
//! back as a `Synced` status condition. Keys carry no payload, so every
//! attempt re-reads fresh state.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::controller::context::Context;
use crate::controller::dependency::dependency_check;
use crate::controller::error::{Error, Result};
use crate::controller::status::{get_condition, get_condition_mut, is_condition_true};
use crate::crd::{RESOURCE_TYPE, ReconcileKey, condition_status, conditions, reasons};
use crate::jenkins::JobSyncError;
use crate::queue::RateLimitingQueue;

/// Outcome of one reconcile attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconcileAction {
    /// Converged or intentionally skipped; do not requeue.
    Done,
    /// Transient failure was recorded; requeue with backoff.
    Requeue,
}

/// Reconcile one PipelineConfig key.
pub async fn reconcile(key: &ReconcileKey, ctx: &Context) -> Result<ReconcileAction> {
    ctx.health.record_event(RESOURCE_TYPE);
    ctx.health
        .metrics
        .record_completed(RESOURCE_TYPE, ctx.queue.len());

    let client = ctx
        .registry
        .pipeline_configs()
        .ok_or(Error::ClientNotRegistered(
            crate::client::registry::ResourceKind::PipelineConfig,
        ))?;

    // Absent from the local index: the resource was deleted. Remove the
    // corresponding Jenkins job; there is no status left to write.
    let Some(original) = client.get(key) else {
        debug!(key = %key, "PipelineConfig gone from index, removing Jenkins job");
        match ctx.job_sync.delete_job(key).await {
            Ok(true) => debug!(key = %key, "Deleted Jenkins job"),
            Ok(false) => debug!(key = %key, "No Jenkins job existed for deleted PipelineConfig"),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete Jenkins job");
                return Err(Error::JobSync(e));
            }
        }
        return Ok(ReconcileAction::Done);
    };

    let status_conditions = original
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();

    // Not yet initialized by the upstream controller: not ours to sync.
    if !is_condition_true(status_conditions, conditions::INITIALIZED) {
        debug!(key = %key, "PipelineConfig not initialized, skipping");
        return Ok(ReconcileAction::Done);
    }

    // Work on a deep copy; `original` is shared with every other reader of
    // the index.
    let mut copy = (*original).clone();
    let Some(mut status) = copy.status.take() else {
        return Ok(ReconcileAction::Done);
    };

    // The Synced condition is created upstream; its absence means the
    // resource is not ready for this controller yet.
    let Some(synced) = get_condition(&status.conditions, conditions::SYNCED) else {
        debug!(key = %key, "PipelineConfig has no Synced condition, skipping");
        return Ok(ReconcileAction::Done);
    };
    if synced.status == condition_status::TRUE {
        debug!(key = %key, "PipelineConfig already synced, skipping");
        return Ok(ReconcileAction::Done);
    }

    debug!(key = %key, "Creating or updating Jenkins job");
    let started = Instant::now();

    // Optimistic pre-write: assume success, overwrite on failure below.
    if let Some(synced) = get_condition_mut(&mut status.conditions, conditions::SYNCED) {
        synced.status = condition_status::TRUE.to_string();
        synced.last_attempt = Some(jiff::Timestamp::now().to_string());
    }

    dependency_check(&copy.spec, ctx.plugins.as_ref(), &mut status.conditions);
    copy.status = Some(status);

    let mut retry_after_persist = false;
    let sync_result = match ctx.job_sync.has_synced_job(&copy).await {
        Ok(true) => Ok(()),
        Ok(false) => match ctx.job_sync.upsert_job(&copy).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(key = %key, "Jenkins rejected the job write");
                return Ok(ReconcileAction::Done);
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = sync_result {
        warn!(key = %key, error = %e, "Failed to sync PipelineConfig to Jenkins job");
        // An I/O failure is worth another attempt once the condition is
        // recorded; a conversion failure only clears on a spec change.
        retry_after_persist = matches!(e, JobSyncError::Io(_));
        if let Some(status) = copy.status.as_mut() {
            if let Some(synced) = get_condition_mut(&mut status.conditions, conditions::SYNCED) {
                synced.status = condition_status::FALSE.to_string();
                synced.reason = reasons::CREATE_JOB_FAILED.to_string();
                synced.message = e.to_string();
            }
        }
    }

    debug!(key = %key, "Persisting PipelineConfig status");
    client.update(&original, &copy).await?;
    ctx.health
        .metrics
        .record_duration(RESOURCE_TYPE, started.elapsed().as_secs_f64());

    if retry_after_persist {
        Ok(ReconcileAction::Requeue)
    } else {
        Ok(ReconcileAction::Done)
    }
}

/// Worker loop: pull keys until the queue shuts down, reconciling each to
/// completion. Failures requeue the key with backoff; successes reset it.
pub async fn run_worker(
    worker: usize,
    queue: Arc<RateLimitingQueue<ReconcileKey>>,
    ctx: Arc<Context>,
) {
    debug!(worker, "Reconcile worker started");
    while let Some(key) = queue.get().await {
        match reconcile(&key, &ctx).await {
            Ok(ReconcileAction::Done) => {
                queue.forget(&key);
            }
            Ok(ReconcileAction::Requeue) => {
                queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                if e.is_conflict() {
                    debug!(key = %key, "Update conflict, requeueing for fresh state");
                } else {
                    warn!(key = %key, error = %e, "Reconcile failed");
                }
                ctx.health.metrics.record_error(RESOURCE_TYPE);
                queue.add_rate_limited(key.clone());
            }
        }
        queue.done(&key);
    }
    debug!(worker, "Reconcile worker stopped");
}
