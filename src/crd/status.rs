//! # WorkReplicaSet Status
//!
//! Status types for tracking fan-out progress and conditions.

use serde::{Deserialize, Serialize};

/// Status of the WorkReplicaSet resource
///
/// Derived entirely from the currently observed `DeliveryWork` objects.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkReplicaSetStatus {
    /// Conditions represent the latest available observations
    /// Types: PlacementVerified, ManifestworkApplied, PlacementRolledOut
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Counts over every owned work
    #[serde(default)]
    pub summary: ManifestWorkSummary,
    /// One entry per placement ref that resolved during the pass
    #[serde(default)]
    pub placement_summary: Vec<PlacementSummary>,
    /// Generation of the spec this status was computed for
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Aggregated counts of work conditions
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSummary {
    pub total: i32,
    pub applied: i32,
    pub available: i32,
    pub degraded: i32,
    pub progressing: i32,
}

/// Per-placement breakdown of the summary
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSummary {
    /// Placement name
    pub name: String,
    /// Number of clusters the placement currently selects
    pub resolved_targets: i32,
    /// Counts over the works on those clusters
    pub summary: ManifestWorkSummary,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
    /// Generation of the object the condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(condition_type: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: condition_status(status).to_string(),
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            observed_generation: None,
        }
    }

    /// Same condition, stamped with the generation it describes
    #[must_use]
    pub fn for_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Kubernetes string form of a boolean condition status
pub fn condition_status(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == "True")
}
