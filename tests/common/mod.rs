//! Common test utilities for pipeline scenario tests
//!
//! Builds replica sets and wires a [`Context`] over the in-memory store and
//! the static placement resolver.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::sync::Arc;

use serde_json::json;
use workset_controller::config::ControllerConfig;
use workset_controller::controller::index::PlacementIndex;
use workset_controller::controller::reconciler::{sync, Context, SyncError};
use workset_controller::crd::{
    find_condition, Condition, DeliveryWork, ManifestTemplate, PlacementRef, RolloutStrategy,
    UpdateStrategy, WorkReplicaSet, WorkReplicaSetSpec, WORK_CONDITION_APPLIED,
    WORK_CONDITION_AVAILABLE,
};
use workset_controller::placement::StaticPlacementResolver;
use workset_controller::store::MemoryStore;

pub const NAMESPACE: &str = "ns1";
pub const NAME: &str = "app";
pub const KEY: &str = "ns1/app";

pub fn config_map(name: &str, value: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": "default"},
        "data": {"value": value}
    })
}

pub fn template(manifest: serde_json::Value, update_strategy: UpdateStrategy) -> ManifestTemplate {
    ManifestTemplate {
        manifest,
        update_strategy,
    }
}

pub fn placement(name: &str) -> PlacementRef {
    PlacementRef {
        name: name.to_string(),
        rollout_strategy: RolloutStrategy::All,
    }
}

pub fn progressive(name: &str, max_concurrency: u32) -> PlacementRef {
    PlacementRef {
        name: name.to_string(),
        rollout_strategy: RolloutStrategy::Progressive { max_concurrency },
    }
}

/// `ns1/app` with one ConfigMap template
pub fn replica_set(placement_refs: Vec<PlacementRef>) -> WorkReplicaSet {
    let mut rs = WorkReplicaSet::new(
        NAME,
        WorkReplicaSetSpec {
            manifest_templates: vec![template(config_map("app-config", "v1"), UpdateStrategy::Update)],
            placement_refs,
        },
    );
    rs.metadata.namespace = Some(NAMESPACE.to_string());
    rs.metadata.generation = Some(1);
    rs
}

/// Mark a replica set for deletion the way the API server does
pub fn mark_deleting(mut rs: WorkReplicaSet) -> WorkReplicaSet {
    rs.metadata.deletion_timestamp =
        Some(serde_json::from_value(json!("2026-01-01T00:00:00Z")).unwrap());
    rs
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub resolver: Arc<StaticPlacementResolver>,
    pub ctx: Context,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(StaticPlacementResolver::new());
        let ctx = Context::new(
            Arc::clone(&store) as _,
            Arc::clone(&resolver) as _,
            Arc::new(PlacementIndex::default()),
            Arc::new(ControllerConfig::default()),
        );
        Self {
            store,
            resolver,
            ctx,
        }
    }

    /// Select `clusters` for placement `name` in the test namespace
    pub fn select(&self, name: &str, clusters: &[&str]) {
        self.resolver.set(NAMESPACE, name, clusters.iter().copied());
    }

    pub async fn sync(&self) -> Result<(), SyncError> {
        sync(&self.ctx, KEY).await
    }

    pub fn replica_set(&self) -> Option<WorkReplicaSet> {
        self.store.replica_set(NAMESPACE, NAME)
    }

    /// Replace the stored replica set, as a user edit would
    pub fn edit(&self, f: impl FnOnce(&mut WorkReplicaSet)) {
        let mut rs = self.replica_set().expect("replica set exists");
        f(&mut rs);
        self.store.insert_replica_set(rs);
    }

    pub fn condition(&self, condition_type: &str) -> Option<Condition> {
        let rs = self.replica_set()?;
        find_condition(&rs.status?.conditions, condition_type).cloned()
    }

    /// Target cluster of every stored work, sorted
    pub fn targets(&self) -> Vec<String> {
        self.store
            .works()
            .iter()
            .filter_map(|w| w.metadata.namespace.clone())
            .collect()
    }

    pub fn work(&self, target: &str) -> DeliveryWork {
        self.store.work(target, NAME).expect("work exists")
    }

    /// Simulate the agent on `target` reporting the work applied and available
    pub fn report_available(&self, target: &str) {
        self.store.set_work_conditions(
            target,
            NAME,
            vec![
                Condition::new(WORK_CONDITION_APPLIED, true, "AppliedManifestComplete", ""),
                Condition::new(WORK_CONDITION_AVAILABLE, true, "ResourcesAvailable", ""),
            ],
        );
    }

    pub fn report_applied(&self, target: &str) {
        self.store.set_work_conditions(
            target,
            NAME,
            vec![Condition::new(
                WORK_CONDITION_APPLIED,
                true,
                "AppliedManifestComplete",
                "",
            )],
        );
    }
}
