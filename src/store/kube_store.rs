//! Kubernetes-backed [`WorkStore`].

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::constants::FIELD_MANAGER;
use crate::controller::keys::QueueKey;
use crate::crd::{DeliveryWork, WorkReplicaSet};
use crate::store::{StoreError, WorkStore};

#[derive(Clone)]
pub struct KubeWorkStore {
    client: Client,
}

impl std::fmt::Debug for KubeWorkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWorkStore").finish_non_exhaustive()
    }
}

impl KubeWorkStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn replica_sets(&self, namespace: &str) -> Api<WorkReplicaSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn works(&self, namespace: &str) -> Api<DeliveryWork> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        }
    }
}

/// Translate 404/409 API responses into typed store errors
fn classify(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: api_err.message.clone(),
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl WorkStore for KubeWorkStore {
    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkReplicaSet>, StoreError> {
        self.replica_sets(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, "WorkReplicaSet", namespace, name))
    }

    async fn list_works(&self, owner: &QueueKey) -> Result<Vec<DeliveryWork>, StoreError> {
        let api: Api<DeliveryWork> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&owner.label_selector());
        let works = api.list(&params).await?;
        debug!(owner = %owner, count = works.items.len(), "listed delivery works");
        Ok(works.items)
    }

    async fn create_work(&self, work: &DeliveryWork) -> Result<DeliveryWork, StoreError> {
        let namespace = work.namespace().unwrap_or_default();
        self.works(&namespace)
            .create(&Self::post_params(), work)
            .await
            .map_err(|e| classify(e, "DeliveryWork", &namespace, &work.name_any()))
    }

    async fn update_work(&self, work: &DeliveryWork) -> Result<DeliveryWork, StoreError> {
        let namespace = work.namespace().unwrap_or_default();
        let name = work.name_any();
        self.works(&namespace)
            .replace(&name, &Self::post_params(), work)
            .await
            .map_err(|e| classify(e, "DeliveryWork", &namespace, &name))
    }

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .works(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(classify(e, "DeliveryWork", namespace, name)),
        }
    }

    async fn patch_finalizers(
        &self,
        rs: &WorkReplicaSet,
        finalizers: &[String],
    ) -> Result<WorkReplicaSet, StoreError> {
        let namespace = rs.namespace().unwrap_or_default();
        let name = rs.name_any();
        // resourceVersion turns the merge patch into an optimistic-concurrency write
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": rs.resource_version(),
            }
        });
        self.replica_sets(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, "WorkReplicaSet", &namespace, &name))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.replica_sets(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| classify(e, "WorkReplicaSet", namespace, name))
    }
}
