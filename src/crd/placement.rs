//! # Placement
//!
//! Selection policy resources. The controller only reads them: a `Placement`
//! is the policy, its `PlacementDecision`s (linked through the
//! `cluster.fleet.dev/placement` label) carry the selected clusters.

use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Placement",
    group = "cluster.fleet.dev",
    version = "v1beta1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSpec {
    /// Cluster sets the policy draws from
    #[serde(default)]
    pub cluster_sets: Vec<String>,
    /// Selection policy, interpreted only by the placement scheduler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::schema::opaque_object")]
    pub policy: Option<serde_json::Value>,
}

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PlacementDecision",
    group = "cluster.fleet.dev",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::PlacementDecisionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PlacementDecisionSpec {
    /// Index of the decision group this slice belongs to
    #[serde(default)]
    pub decision_group_index: i32,
    #[serde(default)]
    pub decision_group_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementDecisionStatus {
    #[serde(default)]
    pub decisions: Vec<ClusterDecision>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDecision {
    pub cluster_name: String,
    #[serde(default)]
    pub reason: String,
}

impl PlacementDecision {
    /// Name of the placement this decision belongs to, taken from its label
    pub fn placement_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(crate::constants::PLACEMENT_DECISION_LABEL))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Non-empty cluster names selected by this decision slice
    pub fn cluster_names(&self) -> impl Iterator<Item = &str> {
        self.status
            .iter()
            .flat_map(|s| s.decisions.iter())
            .map(|d| d.cluster_name.as_str())
            .filter(|name| !name.is_empty())
    }
}
