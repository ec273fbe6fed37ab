//! # Sync
//!
//! Entry point of one reconciliation pass for a queue key.

use std::time::Instant;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::keys::QueueKey;
use crate::controller::patch::status_patch;
use crate::controller::reconciler::pipeline::Pipeline;
use crate::controller::reconciler::types::{
    Context, PassState, StageError, StageKind, SyncError, TargetOutcome,
};
use crate::crd::WorkReplicaSet;
use crate::observability;

/// Reconcile the replica set named by `key` (`namespace/name`).
///
/// Malformed keys and replica sets that no longer exist are not errors. Every
/// error raised along the way is returned, in order, in one aggregate.
pub async fn sync(ctx: &Context, key: &str) -> Result<(), SyncError> {
    let key: QueueKey = match key.parse() {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "dropping malformed queue key");
            return Ok(());
        }
    };

    let resource = match ctx.store.get_replica_set(&key.namespace, &key.name).await {
        Ok(Some(resource)) => resource,
        Ok(None) => {
            debug!(resource = %key, "replica set not found, nothing to do");
            return Ok(());
        }
        Err(e) => {
            return Err(SyncError::Aggregate(vec![StageError::new(
                StageKind::Load,
                None,
                e,
            )]));
        }
    };

    let pass = sync_replica_set(ctx, &Pipeline::default(), resource).await;
    if pass.errors.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Aggregate(pass.errors))
    }
}

/// Run `resource` through `pipeline` and persist the status delta.
///
/// The loaded object is never mutated; stages work on a clone.
pub async fn sync_replica_set(
    ctx: &Context,
    pipeline: &Pipeline,
    resource: WorkReplicaSet,
) -> PassState {
    let start = Instant::now();
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let mut pass = PassState::default();

    let updated = pipeline.run(ctx, resource.clone(), &mut pass).await;

    if let Err(e) = persist_status(ctx, &resource, &updated).await {
        pass.errors.push(e);
    }

    info!(
        resource.namespace = %namespace,
        resource.name = %name,
        stopped_by = pass.stopped_by.map(|s| s.as_str()),
        writes = pass.writes(),
        deferred = pass.count(TargetOutcome::Deferred),
        errors = pass.errors.len(),
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "sync pass finished"
    );
    pass
}

/// Patch the status sub-resource with the exact delta, if there is one
async fn persist_status(
    ctx: &Context,
    original: &WorkReplicaSet,
    updated: &WorkReplicaSet,
) -> Result<(), StageError> {
    if updated.status.is_none() {
        return Ok(());
    }
    let encode = |status| {
        serde_json::to_value(status).map_err(|e| StageError::new(StageKind::StatusPatch, None, e))
    };
    let old = encode(&original.status)?;
    let new = encode(&updated.status)?;
    let Some(patch) = status_patch(&old, &new) else {
        debug!(resource.name = %original.name_any(), "status unchanged, skipping patch");
        return Ok(());
    };

    let namespace = original.namespace().unwrap_or_default();
    match ctx
        .store
        .patch_status(&namespace, &original.name_any(), &patch)
        .await
    {
        Ok(()) => {
            observability::metrics::increment_status_patches();
            Ok(())
        }
        // Deleted while the pass ran; its status no longer matters
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(StageError::new(StageKind::StatusPatch, None, e)),
    }
}
