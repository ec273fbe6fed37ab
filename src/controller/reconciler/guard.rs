//! # Guard-Install Stage
//!
//! Makes sure the cleanup finalizer is on a live replica set before any work
//! is created for it.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::constants::WORK_CLEANUP_FINALIZER;
use crate::controller::reconciler::pipeline::Stage;
use crate::controller::reconciler::types::{
    Context, PassState, StageError, StageKind, StageOutcome,
};
use crate::crd::WorkReplicaSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct GuardInstallStage;

#[async_trait]
impl Stage for GuardInstallStage {
    fn kind(&self) -> StageKind {
        StageKind::GuardInstall
    }

    async fn reconcile(
        &self,
        ctx: &Context,
        resource: WorkReplicaSet,
        _pass: &mut PassState,
    ) -> StageOutcome {
        if resource.is_deleting() || resource.has_cleanup_finalizer() {
            return StageOutcome::proceed(resource);
        }

        let mut finalizers = resource.finalizers().to_vec();
        finalizers.push(WORK_CLEANUP_FINALIZER.to_string());

        match ctx.store.patch_finalizers(&resource, &finalizers).await {
            Ok(updated) => {
                debug!(
                    resource.namespace = %resource.namespace().unwrap_or_default(),
                    resource.name = %resource.name_any(),
                    "cleanup finalizer installed"
                );
                StageOutcome::proceed(updated)
            }
            Err(e) => {
                // The resource stays unguarded; distribution refuses to create works for it
                warn!(
                    resource.namespace = %resource.namespace().unwrap_or_default(),
                    resource.name = %resource.name_any(),
                    error = %e,
                    "failed to install cleanup finalizer"
                );
                StageOutcome::proceed(resource)
                    .with_error(StageError::new(StageKind::GuardInstall, None, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::index::PlacementIndex;
    use crate::controller::reconciler::types::Signal;
    use crate::crd::WorkReplicaSetSpec;
    use crate::placement::StaticPlacementResolver;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, Context) {
        let store = Arc::new(MemoryStore::new());
        let mut rs = WorkReplicaSet::new("app", WorkReplicaSetSpec::default());
        rs.metadata.namespace = Some("ns1".to_string());
        store.insert_replica_set(rs);
        let ctx = Context::new(
            store.clone(),
            Arc::new(StaticPlacementResolver::new()),
            Arc::new(PlacementIndex::default()),
            Arc::new(ControllerConfig::default()),
        );
        (store, ctx)
    }

    #[tokio::test]
    async fn test_installs_guard_once() {
        let (store, ctx) = setup();
        let rs = store.replica_set("ns1", "app").unwrap();

        let outcome = GuardInstallStage
            .reconcile(&ctx, rs, &mut PassState::default())
            .await;
        assert_eq!(outcome.signal, Signal::Continue);
        assert!(outcome.resource.has_cleanup_finalizer());
        assert_eq!(store.take_writes().len(), 1);

        // Second run on the guarded resource writes nothing
        let outcome = GuardInstallStage
            .reconcile(&ctx, outcome.resource, &mut PassState::default())
            .await;
        assert!(outcome.errors.is_empty());
        assert!(store.take_writes().is_empty());
    }

    #[tokio::test]
    async fn test_patch_failure_continues_without_guard() {
        let (store, ctx) = setup();
        store.fail_finalizer_patch(true);
        let rs = store.replica_set("ns1", "app").unwrap();

        let outcome = GuardInstallStage
            .reconcile(&ctx, rs, &mut PassState::default())
            .await;
        assert_eq!(outcome.signal, Signal::Continue);
        assert_eq!(outcome.errors.len(), 1);
        assert!(!outcome.resource.has_cleanup_finalizer());
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let (store, ctx) = setup();
        let mut rs = store.replica_set("ns1", "app").unwrap();
        rs.metadata.resource_version = Some("stale".to_string());

        let outcome = GuardInstallStage
            .reconcile(&ctx, rs, &mut PassState::default())
            .await;
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0].source,
            crate::controller::reconciler::types::StageFailure::Store(e) if e.is_conflict()
        ));
    }
}
