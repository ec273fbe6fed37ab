//! # Work Store
//!
//! Storage seam between the reconciler and the Kubernetes API.
//!
//! The reconciler only ever talks to a [`WorkStore`]; production wiring uses
//! [`KubeWorkStore`], tests and dry runs use [`MemoryStore`].

use async_trait::async_trait;
use thiserror::Error;

use crate::controller::keys::QueueKey;
use crate::crd::{DeliveryWork, WorkReplicaSet};

mod kube_store;
mod memory;

pub use kube_store::KubeWorkStore;
pub use memory::{MemoryStore, Write};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
        message: String,
    },
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("failed to serialize patch: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Storage operations the reconciler depends on
#[async_trait]
pub trait WorkStore: Send + Sync {
    /// Get a replica set, `None` when it does not exist
    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkReplicaSet>, StoreError>;

    /// List every work carrying the owner's correlation label, across all namespaces
    async fn list_works(&self, owner: &QueueKey) -> Result<Vec<DeliveryWork>, StoreError>;

    /// Create a work; the namespace is the target cluster
    async fn create_work(&self, work: &DeliveryWork) -> Result<DeliveryWork, StoreError>;

    /// Replace a work; `metadata.resourceVersion` must match the stored object
    async fn update_work(&self, work: &DeliveryWork) -> Result<DeliveryWork, StoreError>;

    /// Delete a work. Deleting a missing work succeeds.
    async fn delete_work(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Set the finalizer list of a replica set, guarded by its resource version
    async fn patch_finalizers(
        &self,
        rs: &WorkReplicaSet,
        finalizers: &[String],
    ) -> Result<WorkReplicaSet, StoreError>;

    /// Apply a JSON merge patch (`{"status": {...}}`) to the status subresource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;
}
