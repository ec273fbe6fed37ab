//! # Finalize Stage
//!
//! Cleanup for a replica set marked for deletion.
//!
//! While owned works remain, each one is deleted and the pass stops with the
//! cleanup finalizer still in place; the deletion events of those works bring
//! the key back. Once a pass observes zero owned works the finalizer is
//! removed, which lets the API server drop the replica set.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::constants::WORK_CLEANUP_FINALIZER;
use crate::controller::keys::own_key;
use crate::controller::reconciler::pipeline::Stage;
use crate::controller::reconciler::types::{
    Context, PassState, StageError, StageKind, StageOutcome, TargetOutcome,
};
use crate::crd::WorkReplicaSet;
use crate::observability;

#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Finalize
    }

    async fn reconcile(
        &self,
        ctx: &Context,
        resource: WorkReplicaSet,
        pass: &mut PassState,
    ) -> StageOutcome {
        if !resource.is_deleting() {
            return StageOutcome::proceed(resource);
        }
        let Some(key) = own_key(&resource) else {
            return StageOutcome::stop(resource);
        };

        let works = match ctx.store.list_works(&key).await {
            Ok(works) => works,
            Err(e) => {
                warn!(resource = %key, error = %e, "failed to list works during cleanup");
                return StageOutcome::stop(resource)
                    .with_error(StageError::new(StageKind::Finalize, None, e));
            }
        };

        if works.is_empty() {
            return remove_guard(ctx, resource).await;
        }

        let mut errors = Vec::new();
        for work in &works {
            let target = work.namespace().unwrap_or_default();
            if work.is_deleting() {
                debug!(resource = %key, target = %target, "work already being deleted");
                continue;
            }
            match ctx.store.delete_work(&target, &work.name_any()).await {
                Ok(()) => {
                    observability::metrics::increment_work_operations("delete");
                    pass.record(&target, TargetOutcome::Deleted);
                }
                Err(e) => {
                    warn!(resource = %key, target = %target, error = %e, "failed to delete work");
                    pass.record(&target, TargetOutcome::Failed);
                    errors.push(StageError::new(StageKind::Finalize, Some(target.as_str()), e));
                }
            }
        }
        info!(
            resource = %key,
            works = works.len(),
            "deleting owned works, keeping cleanup finalizer until they are gone"
        );
        StageOutcome::stop(resource).with_errors(errors)
    }
}

/// Drop the cleanup finalizer, leaving any foreign finalizers untouched
async fn remove_guard(ctx: &Context, resource: WorkReplicaSet) -> StageOutcome {
    if !resource.has_cleanup_finalizer() {
        return StageOutcome::stop(resource);
    }
    let remaining: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != WORK_CLEANUP_FINALIZER)
        .cloned()
        .collect();

    match ctx.store.patch_finalizers(&resource, &remaining).await {
        Ok(updated) => {
            info!(
                resource.namespace = %resource.namespace().unwrap_or_default(),
                resource.name = %resource.name_any(),
                "all works removed, cleanup finalizer released"
            );
            StageOutcome::stop(updated)
        }
        // Already gone: nothing left to guard
        Err(e) if e.is_not_found() => StageOutcome::stop(resource),
        Err(e) => StageOutcome::stop(resource)
            .with_error(StageError::new(StageKind::Finalize, None, e)),
    }
}
