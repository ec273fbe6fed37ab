//! # In-Memory Store
//!
//! A [`WorkStore`] backed by plain maps. It mimics the API server semantics the
//! reconciler relies on (resource versions, conflicts, finalizer-gated
//! deletion, status merge patches) and lets tests inject failures per target
//! and per operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::ResourceExt;

use crate::controller::keys::{owner_key_from_work, QueueKey};
use crate::controller::patch::apply_merge_patch;
use crate::crd::{Condition, DeliveryWork, DeliveryWorkStatus, WorkReplicaSet};
use crate::store::{StoreError, WorkStore};

type ObjectKey = (String, String);

/// One write issued against the store, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateWork { namespace: String, name: String },
    UpdateWork { namespace: String, name: String },
    DeleteWork { namespace: String, name: String },
    PatchFinalizers { namespace: String, name: String },
    PatchStatus { namespace: String, name: String },
}

#[derive(Debug, Default)]
struct Failures {
    create_in: BTreeSet<String>,
    update_in: BTreeSet<String>,
    delete_in: BTreeSet<String>,
    list: bool,
    finalizers: bool,
    status: bool,
}

#[derive(Debug, Default)]
struct State {
    replica_sets: BTreeMap<ObjectKey, WorkReplicaSet>,
    works: BTreeMap<ObjectKey, DeliveryWork>,
    writes: Vec<Write>,
    failures: Failures,
    resource_version: u64,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn key_of<K: ResourceExt>(obj: &K) -> ObjectKey {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn injected(operation: &str, namespace: &str, name: &str) -> StoreError {
    StoreError::Conflict {
        kind: "injected",
        namespace: namespace.to_string(),
        name: name.to_string(),
        message: format!("injected {operation} failure"),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a replica set, assigning it a resource version
    pub fn insert_replica_set(&self, mut rs: WorkReplicaSet) {
        let mut state = self.lock();
        rs.metadata.resource_version = Some(state.next_resource_version());
        state.replica_sets.insert(key_of(&rs), rs);
    }

    pub fn replica_set(&self, namespace: &str, name: &str) -> Option<WorkReplicaSet> {
        self.lock()
            .replica_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Insert or overwrite a work without recording a write
    pub fn insert_work(&self, mut work: DeliveryWork) {
        let mut state = self.lock();
        work.metadata.resource_version = Some(state.next_resource_version());
        state.works.insert(key_of(&work), work);
    }

    pub fn work(&self, namespace: &str, name: &str) -> Option<DeliveryWork> {
        self.lock()
            .works
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every stored work, ordered by namespace then name
    pub fn works(&self) -> Vec<DeliveryWork> {
        self.lock().works.values().cloned().collect()
    }

    /// Simulate the agent on the target reporting conditions for the work's
    /// current generation
    pub fn set_work_conditions(&self, namespace: &str, name: &str, conditions: Vec<Condition>) {
        if let Some(work) = self
            .lock()
            .works
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            let generation = work.metadata.generation;
            let conditions = conditions
                .into_iter()
                .map(|c| c.for_generation(generation))
                .collect();
            work.status = Some(DeliveryWorkStatus { conditions });
        }
    }

    /// Writes recorded since the last call
    pub fn take_writes(&self) -> Vec<Write> {
        std::mem::take(&mut self.lock().writes)
    }

    pub fn fail_creates_in(&self, namespace: &str) {
        self.lock().failures.create_in.insert(namespace.to_string());
    }

    pub fn fail_updates_in(&self, namespace: &str) {
        self.lock().failures.update_in.insert(namespace.to_string());
    }

    pub fn fail_deletes_in(&self, namespace: &str) {
        self.lock().failures.delete_in.insert(namespace.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.lock().failures.list = fail;
    }

    pub fn fail_finalizer_patch(&self, fail: bool) {
        self.lock().failures.finalizers = fail;
    }

    pub fn fail_status_patch(&self, fail: bool) {
        self.lock().failures.status = fail;
    }

    /// Clear every injected failure
    pub fn heal(&self) {
        self.lock().failures = Failures::default();
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkReplicaSet>, StoreError> {
        Ok(self.replica_set(namespace, name))
    }

    async fn list_works(&self, owner: &QueueKey) -> Result<Vec<DeliveryWork>, StoreError> {
        let state = self.lock();
        if state.failures.list {
            return Err(injected("list", &owner.namespace, &owner.name));
        }
        Ok(state
            .works
            .values()
            .filter(|work| owner_key_from_work(work).as_ref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn create_work(&self, work: &DeliveryWork) -> Result<DeliveryWork, StoreError> {
        let mut state = self.lock();
        let (namespace, name) = key_of(work);
        if state.failures.create_in.contains(&namespace) {
            return Err(injected("create", &namespace, &name));
        }
        if state.works.contains_key(&(namespace.clone(), name.clone())) {
            return Err(StoreError::Conflict {
                kind: "DeliveryWork",
                namespace,
                name,
                message: "already exists".to_string(),
            });
        }
        let mut created = work.clone();
        created.metadata.resource_version = Some(state.next_resource_version());
        created.status = None;
        created.metadata.generation = Some(1);
        state.writes.push(Write::CreateWork {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        state.works.insert((namespace, name), created.clone());
        Ok(created)
    }

    async fn update_work(&self, work: &DeliveryWork) -> Result<DeliveryWork, StoreError> {
        let mut state = self.lock();
        let (namespace, name) = key_of(work);
        if state.failures.update_in.contains(&namespace) {
            return Err(injected("update", &namespace, &name));
        }
        let Some(stored) = state.works.get(&(namespace.clone(), name.clone())) else {
            return Err(StoreError::NotFound {
                kind: "DeliveryWork",
                namespace,
                name,
            });
        };
        if stored.metadata.resource_version != work.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "DeliveryWork",
                namespace,
                name,
                message: "resource version mismatch".to_string(),
            });
        }
        // Status is a separate sub-resource; generation moves only with the spec
        let mut updated = work.clone();
        updated.status = stored.status.clone();
        updated.metadata.generation = if stored.spec == work.spec {
            stored.metadata.generation
        } else {
            Some(stored.metadata.generation.unwrap_or_default() + 1)
        };
        updated.metadata.resource_version = Some(state.next_resource_version());
        state.writes.push(Write::UpdateWork {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        state.works.insert((namespace, name), updated.clone());
        Ok(updated)
    }

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.failures.delete_in.contains(namespace) {
            return Err(injected("delete", namespace, name));
        }
        state.writes.push(Write::DeleteWork {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.works.remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn patch_finalizers(
        &self,
        rs: &WorkReplicaSet,
        finalizers: &[String],
    ) -> Result<WorkReplicaSet, StoreError> {
        let mut state = self.lock();
        let (namespace, name) = key_of(rs);
        if state.failures.finalizers {
            return Err(injected("finalizer patch", &namespace, &name));
        }
        let key = (namespace.clone(), name.clone());
        let Some(stored) = state.replica_sets.get(&key).cloned() else {
            return Err(StoreError::NotFound {
                kind: "WorkReplicaSet",
                namespace,
                name,
            });
        };
        if stored.metadata.resource_version != rs.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "WorkReplicaSet",
                namespace,
                name,
                message: "resource version mismatch".to_string(),
            });
        }
        let mut patched = stored;
        patched.metadata.finalizers = Some(finalizers.to_vec());
        patched.metadata.resource_version = Some(state.next_resource_version());
        state.writes.push(Write::PatchFinalizers {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        if patched.is_deleting() && finalizers.is_empty() {
            // Last finalizer gone on a deleting object: the API server removes it
            state.replica_sets.remove(&key);
        } else {
            state.replica_sets.insert(key, patched.clone());
        }
        Ok(patched)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.failures.status {
            return Err(injected("status patch", namespace, name));
        }
        let key = (namespace.to_string(), name.to_string());
        let Some(stored) = state.replica_sets.get(&key).cloned() else {
            return Err(StoreError::NotFound {
                kind: "WorkReplicaSet",
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        let mut document = serde_json::to_value(&stored)?;
        apply_merge_patch(&mut document, patch);
        let mut patched: WorkReplicaSet = serde_json::from_value(document)?;
        patched.metadata.resource_version = Some(state.next_resource_version());
        state.writes.push(Write::PatchStatus {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.replica_sets.insert(key, patched);
        Ok(())
    }
}
