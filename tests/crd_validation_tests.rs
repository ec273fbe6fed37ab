//! # CRD Validation Tests
//!
//! Sample resources deserialize into the CRD types and the generated
//! definitions carry the expected names, scopes and subresources.

use kube::CustomResourceExt;
use workset_controller::crd::{
    DeliveryWork, Placement, PlacementDecision, RolloutStrategy, UpdateStrategy, WorkReplicaSet,
};

#[test]
fn test_replica_set_with_all_fields() {
    let yaml = r#"
apiVersion: work.fleet.dev/v1alpha1
kind: WorkReplicaSet
metadata:
  name: app
  namespace: ns1
spec:
  manifestTemplates:
    - manifest:
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: app-config
          namespace: default
        data:
          key: value
    - manifest:
        apiVersion: v1
        kind: Secret
        metadata:
          name: seed
          namespace: default
      updateStrategy: CreateOnly
  placementRefs:
    - name: all-clusters
    - name: canary
      rolloutStrategy:
        type: Progressive
        maxConcurrency: 2
"#;

    let rs: WorkReplicaSet =
        serde_yaml::from_str(yaml).expect("Should deserialize WorkReplicaSet with all fields");

    assert_eq!(rs.spec.manifest_templates.len(), 2);
    assert_eq!(
        rs.spec.manifest_templates[0].update_strategy,
        UpdateStrategy::Update
    );
    assert_eq!(
        rs.spec.manifest_templates[1].update_strategy,
        UpdateStrategy::CreateOnly
    );
    assert_eq!(rs.spec.manifest_templates[0].manifest["data"]["key"], "value");
    assert_eq!(rs.spec.placement_refs[0].rollout_strategy, RolloutStrategy::All);
    assert_eq!(
        rs.spec.placement_refs[1].rollout_strategy,
        RolloutStrategy::Progressive { max_concurrency: 2 }
    );
    assert!(rs.status.is_none());
}

#[test]
fn test_replica_set_minimal_spec() {
    let yaml = r#"
apiVersion: work.fleet.dev/v1alpha1
kind: WorkReplicaSet
metadata:
  name: empty
  namespace: ns1
spec: {}
"#;

    let rs: WorkReplicaSet = serde_yaml::from_str(yaml).expect("Should deserialize empty spec");
    assert!(rs.spec.manifest_templates.is_empty());
    assert!(rs.spec.placement_refs.is_empty());
}

#[test]
fn test_replica_set_status_round_trips_camel_case() {
    let yaml = r#"
apiVersion: work.fleet.dev/v1alpha1
kind: WorkReplicaSet
metadata:
  name: app
  namespace: ns1
spec: {}
status:
  observedGeneration: 3
  summary:
    total: 2
    applied: 2
    available: 1
    degraded: 0
    progressing: 1
  placementSummary:
    - name: all-clusters
      resolvedTargets: 2
      summary:
        total: 2
        applied: 2
        available: 1
        degraded: 0
        progressing: 1
  conditions:
    - type: ManifestworkApplied
      status: "True"
      reason: AsExpected
      message: 2 of 2 works applied
      lastTransitionTime: "2026-01-01T00:00:00Z"
"#;

    let rs: WorkReplicaSet = serde_yaml::from_str(yaml).expect("Should deserialize status");
    let status = rs.status.expect("status present");
    assert_eq!(status.observed_generation, Some(3));
    assert_eq!(status.summary.available, 1);
    assert_eq!(status.placement_summary[0].resolved_targets, 2);
    assert_eq!(status.conditions[0].r#type, "ManifestworkApplied");

    let value = serde_json::to_value(&status).unwrap();
    assert!(value.get("placementSummary").is_some());
    assert!(value["conditions"][0].get("lastTransitionTime").is_some());
}

#[test]
fn test_placement_decision_with_decisions() {
    let yaml = r#"
apiVersion: cluster.fleet.dev/v1beta1
kind: PlacementDecision
metadata:
  name: all-clusters-decision-1
  namespace: ns1
  labels:
    cluster.fleet.dev/placement: all-clusters
spec: {}
status:
  decisions:
    - clusterName: c1
      reason: ""
    - clusterName: c2
"#;

    let decision: PlacementDecision =
        serde_yaml::from_str(yaml).expect("Should deserialize PlacementDecision");
    assert_eq!(decision.placement_name(), Some("all-clusters"));
    assert_eq!(decision.cluster_names().collect::<Vec<_>>(), vec!["c1", "c2"]);
}

#[test]
fn test_generated_crds_are_namespaced_with_expected_names() {
    let crds = [
        (WorkReplicaSet::crd(), "workreplicasets.work.fleet.dev"),
        (DeliveryWork::crd(), "deliveryworks.work.fleet.dev"),
        (Placement::crd(), "placements.cluster.fleet.dev"),
        (PlacementDecision::crd(), "placementdecisions.cluster.fleet.dev"),
    ];

    for (crd, name) in crds {
        assert_eq!(crd.metadata.name.as_deref(), Some(name));
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}

#[test]
fn test_replica_set_crd_has_status_subresource() {
    let crd = WorkReplicaSet::crd();
    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    assert!(version
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());
    assert_eq!(crd.spec.names.short_names, Some(vec!["wrs".to_string()]));
}

#[test]
fn test_crds_serialize_to_yaml() {
    let yaml = serde_yaml::to_string(&WorkReplicaSet::crd()).unwrap();
    assert!(yaml.contains("kind: CustomResourceDefinition"));
    assert!(yaml.contains("manifestTemplates"));
    assert!(yaml.contains("x-kubernetes-preserve-unknown-fields"));
}
