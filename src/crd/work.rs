//! # DeliveryWork
//!
//! Per-cluster delivery object. Lives in the namespace named after its target
//! cluster and is written only by this controller; its status is written by the
//! agent running on the target.

use serde::{Deserialize, Serialize};

use crate::crd::{find_condition, Condition, UpdateStrategy};

pub const WORK_CONDITION_APPLIED: &str = "Applied";
pub const WORK_CONDITION_AVAILABLE: &str = "Available";
pub const WORK_CONDITION_DEGRADED: &str = "Degraded";
pub const WORK_CONDITION_PROGRESSING: &str = "Progressing";

#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "DeliveryWork",
    group = "work.fleet.dev",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::DeliveryWorkStatus",
    shortname = "dw",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}, {"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWorkSpec {
    /// Materialized manifests, in template order
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::schema::opaque_object_list")]
    pub manifests: Vec<serde_json::Value>,
    /// Per-manifest options the agent honours when applying
    #[serde(default)]
    pub manifest_configs: Vec<ManifestConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    /// `group/version/kind/namespace/name` of the manifest, or its position when unnamed
    pub identity: String,
    pub update_strategy: UpdateStrategy,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWorkStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DeliveryWork {
    /// Conditions reported by the agent, empty when no status was written yet
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    /// Target cluster, i.e. the namespace the work lives in
    pub fn target(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The agent reports `condition_type` True for the current generation.
    ///
    /// A report made before the last spec change does not count. Works
    /// without a generation (never persisted) accept any report.
    pub fn reports(&self, condition_type: &str) -> bool {
        find_condition(self.conditions(), condition_type).is_some_and(|c| {
            c.status == "True"
                && match self.metadata.generation {
                    Some(generation) => c.observed_generation.is_some_and(|g| g >= generation),
                    None => true,
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::WORK_CONDITION_AVAILABLE;

    fn available(observed_generation: Option<i64>) -> DeliveryWorkStatus {
        DeliveryWorkStatus {
            conditions: vec![Condition::new(WORK_CONDITION_AVAILABLE, true, "ResourcesAvailable", "")
                .for_generation(observed_generation)],
        }
    }

    #[test]
    fn test_reports_requires_current_generation() {
        let mut work = DeliveryWork::new("app", DeliveryWorkSpec::default());
        work.metadata.generation = Some(2);

        work.status = Some(available(Some(1)));
        assert!(!work.reports(WORK_CONDITION_AVAILABLE));

        work.status = Some(available(None));
        assert!(!work.reports(WORK_CONDITION_AVAILABLE));

        work.status = Some(available(Some(2)));
        assert!(work.reports(WORK_CONDITION_AVAILABLE));
        assert!(!work.reports(WORK_CONDITION_APPLIED));
    }

    #[test]
    fn test_reports_without_generation_accepts_any_report() {
        let mut work = DeliveryWork::new("app", DeliveryWorkSpec::default());
        work.status = Some(available(None));
        assert!(work.reports(WORK_CONDITION_AVAILABLE));
    }
}
