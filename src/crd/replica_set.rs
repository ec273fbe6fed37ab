//! # WorkReplicaSet Spec
//!
//! The owning resource: a list of manifest templates and the placements that
//! choose which clusters receive them.

use serde::{Deserialize, Serialize};

/// WorkReplicaSet Custom Resource Definition
///
/// Fans the templated manifests out to every cluster selected by the referenced
/// placements. One `DeliveryWork` is kept per selected cluster.
///
/// # Example
///
/// ```yaml
/// apiVersion: work.fleet.dev/v1alpha1
/// kind: WorkReplicaSet
/// metadata:
///   name: app
///   namespace: ns1
/// spec:
///   manifestTemplates:
///     - manifest:
///         apiVersion: v1
///         kind: ConfigMap
///         metadata:
///           name: app-config
///           namespace: default
///         data:
///           key: value
///   placementRefs:
///     - name: prod-clusters
///       rolloutStrategy:
///         type: Progressive
///         maxConcurrency: 2
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "WorkReplicaSet",
    group = "work.fleet.dev",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::WorkReplicaSetStatus",
    shortname = "wrs",
    printcolumn = r#"{"name":"Placement", "type":"string", "jsonPath":".status.conditions[?(@.type==\"PlacementVerified\")].reason"}, {"name":"Found", "type":"string", "jsonPath":".status.conditions[?(@.type==\"PlacementVerified\")].status"}, {"name":"ManifestWorks", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ManifestworkApplied\")].reason"}, {"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ManifestworkApplied\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkReplicaSetSpec {
    /// Manifests delivered to every selected cluster, in order
    #[serde(default)]
    pub manifest_templates: Vec<ManifestTemplate>,
    /// Placements whose decisions select the target clusters
    #[serde(default)]
    pub placement_refs: Vec<PlacementRef>,
}

/// One manifest plus the strategy used when it already exists on the target
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTemplate {
    /// Opaque Kubernetes object
    #[schemars(schema_with = "crate::crd::schema::opaque_object")]
    pub manifest: serde_json::Value,
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
}

/// How an already-delivered manifest is treated when the template changes
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum UpdateStrategy {
    /// Always reconcile the delivered manifest to the template
    #[default]
    Update,
    /// Deliver once, never touch it again
    CreateOnly,
}

/// Reference to a placement in the replica set's namespace
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRef {
    pub name: String,
    #[serde(default)]
    pub rollout_strategy: RolloutStrategy,
}

/// Rollout pacing across the clusters of one placement
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(tag = "type")]
pub enum RolloutStrategy {
    /// Apply to every selected cluster at once
    #[default]
    All,
    /// Keep at most `maxConcurrency` clusters progressing at a time
    Progressive {
        #[serde(rename = "maxConcurrency")]
        max_concurrency: u32,
    },
}

impl WorkReplicaSet {
    /// Placement refs that name a placement; refs with an empty name are ignored
    pub fn valid_placement_refs(&self) -> impl Iterator<Item = &PlacementRef> {
        self.spec
            .placement_refs
            .iter()
            .filter(|placement_ref| !placement_ref.name.is_empty())
    }

    /// Whether the cleanup finalizer is present
    pub fn has_cleanup_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|s| s == crate::constants::WORK_CLEANUP_FINALIZER))
    }

    /// Whether the resource has been marked for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
