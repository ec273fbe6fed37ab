//! # Queue Keys
//!
//! Maps watch events from every source onto `namespace/name` keys of the
//! owning `WorkReplicaSet`.
//!
//! - A changed replica set maps to its own key.
//! - A changed `DeliveryWork` maps to its owner through the
//!   `work.fleet.dev/replicaset` label (`<namespace>.<name>`).
//! - A changed `Placement` or `PlacementDecision` maps to every replica set
//!   that references the placement, via the [`PlacementIndex`].
//!
//! None of these functions fail: an event that cannot be traced back to a
//! replica set yields no key and is ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use thiserror::Error;

use crate::constants::REPLICA_SET_LABEL;
use crate::controller::index::{placement_key, PlacementIndex};
use crate::crd::{DeliveryWork, Placement, PlacementDecision, WorkReplicaSet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("queue key {0:?} is not in the form namespace/name")]
    Malformed(String),
}

/// Identifies one unit of reconciliation work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueKey {
    pub namespace: String,
    pub name: String,
}

impl QueueKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Value of the correlation label carried by every work this key owns
    pub fn label_value(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Equality selector matching every work owned by this key
    pub fn label_selector(&self) -> String {
        format!("{}={}", REPLICA_SET_LABEL, self.label_value())
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for QueueKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                Ok(QueueKey::new(*namespace, *name))
            }
            _ => Err(KeyError::Malformed(s.to_string())),
        }
    }
}

impl From<&QueueKey> for ObjectRef<WorkReplicaSet> {
    fn from(key: &QueueKey) -> Self {
        ObjectRef::new(&key.name).within(&key.namespace)
    }
}

/// Key of a replica set itself
pub fn own_key(rs: &WorkReplicaSet) -> Option<QueueKey> {
    let namespace = rs.metadata.namespace.as_deref().filter(|ns| !ns.is_empty())?;
    let name = rs.metadata.name.as_deref().filter(|n| !n.is_empty())?;
    Some(QueueKey::new(namespace, name))
}

/// Key of the replica set owning a work, read from its correlation label
pub fn owner_key_from_work(work: &DeliveryWork) -> Option<QueueKey> {
    owner_key_from_labels(work.metadata.labels.as_ref())
}

/// Parse the correlation label out of a label map.
///
/// The value must be exactly two non-empty, dot-separated segments.
pub fn owner_key_from_labels(labels: Option<&BTreeMap<String, String>>) -> Option<QueueKey> {
    let value = labels?.get(REPLICA_SET_LABEL)?;
    match value.split('.').collect::<Vec<_>>().as_slice() {
        [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
            Some(QueueKey::new(*namespace, *name))
        }
        _ => None,
    }
}

/// Keys of every replica set referencing the given placement
pub fn keys_for_placement_change(
    index: &PlacementIndex,
    namespace: &str,
    placement_name: &str,
) -> Vec<QueueKey> {
    index.lookup(&placement_key(namespace, placement_name))
}

/// Keys affected by a change to a placement definition
pub fn keys_for_placement(index: &PlacementIndex, placement: &Placement) -> Vec<QueueKey> {
    match placement.metadata.namespace.as_deref() {
        Some(namespace) => keys_for_placement_change(index, namespace, &placement.name_any()),
        None => Vec::new(),
    }
}

/// Keys affected by a change to a placement's decisions
pub fn keys_for_decision(index: &PlacementIndex, decision: &PlacementDecision) -> Vec<QueueKey> {
    match (decision.metadata.namespace.as_deref(), decision.placement_name()) {
        (Some(namespace), Some(placement_name)) => {
            keys_for_placement_change(index, namespace, placement_name)
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DeliveryWorkSpec, PlacementDecisionSpec, PlacementRef, WorkReplicaSetSpec};

    fn work_with_label(value: Option<&str>) -> DeliveryWork {
        let mut work = DeliveryWork::new("app", DeliveryWorkSpec::default());
        work.metadata.namespace = Some("c1".to_string());
        if let Some(value) = value {
            work.metadata.labels = Some(BTreeMap::from([(
                REPLICA_SET_LABEL.to_string(),
                value.to_string(),
            )]));
        }
        work
    }

    fn replica_set(namespace: &str, name: &str, placements: &[&str]) -> WorkReplicaSet {
        let mut rs = WorkReplicaSet::new(
            name,
            WorkReplicaSetSpec {
                manifest_templates: vec![],
                placement_refs: placements
                    .iter()
                    .map(|p| PlacementRef {
                        name: (*p).to_string(),
                        ..PlacementRef::default()
                    })
                    .collect(),
            },
        );
        rs.metadata.namespace = Some(namespace.to_string());
        rs
    }

    #[test]
    fn test_queue_key_display_and_parse() {
        let key: QueueKey = "ns1/app".parse().unwrap();
        assert_eq!(key, QueueKey::new("ns1", "app"));
        assert_eq!(key.to_string(), "ns1/app");
        assert_eq!(key.label_value(), "ns1.app");
        assert_eq!(key.label_selector(), "work.fleet.dev/replicaset=ns1.app");
    }

    #[test]
    fn test_queue_key_rejects_malformed() {
        for raw in ["", "app", "/app", "ns1/", "a/b/c", "ns1//app"] {
            assert_eq!(
                raw.parse::<QueueKey>(),
                Err(KeyError::Malformed(raw.to_string())),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_own_key() {
        let rs = replica_set("ns1", "app", &[]);
        assert_eq!(own_key(&rs), Some(QueueKey::new("ns1", "app")));

        let mut no_namespace = rs.clone();
        no_namespace.metadata.namespace = None;
        assert_eq!(own_key(&no_namespace), None);
    }

    #[test]
    fn test_owner_key_from_work_valid_label() {
        let work = work_with_label(Some("ns1.app"));
        assert_eq!(owner_key_from_work(&work), Some(QueueKey::new("ns1", "app")));
    }

    #[test]
    fn test_owner_key_from_work_missing_label() {
        assert_eq!(owner_key_from_work(&work_with_label(None)), None);
    }

    #[test]
    fn test_owner_key_from_work_single_segment() {
        assert_eq!(owner_key_from_work(&work_with_label(Some("badlabel"))), None);
    }

    #[test]
    fn test_owner_key_from_work_malformed_shapes() {
        for value in ["", ".", "ns1.", ".app", "a.b.c", "ns1..app"] {
            assert_eq!(owner_key_from_work(&work_with_label(Some(value))), None, "{value}");
        }
    }

    #[test]
    fn test_keys_for_decision_uses_placement_label() {
        let index = PlacementIndex::default();
        index.upsert(&replica_set("ns1", "app", &["p1"]));
        index.upsert(&replica_set("ns1", "other", &["p1", "p2"]));
        index.upsert(&replica_set("ns2", "app", &["p1"]));

        let mut decision = PlacementDecision::new("p1-decision-1", PlacementDecisionSpec::default());
        decision.metadata.namespace = Some("ns1".to_string());
        decision.metadata.labels = Some(BTreeMap::from([(
            crate::constants::PLACEMENT_DECISION_LABEL.to_string(),
            "p1".to_string(),
        )]));

        assert_eq!(
            keys_for_decision(&index, &decision),
            vec![QueueKey::new("ns1", "app"), QueueKey::new("ns1", "other")]
        );

        decision.metadata.labels = None;
        assert!(keys_for_decision(&index, &decision).is_empty());
    }
}
