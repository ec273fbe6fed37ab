//! # Placement Index
//!
//! Reverse mapping from a placement (`namespace/name`) to the replica sets
//! referencing it, so that a change in a placement's decisions can be turned
//! into the keys that need another pass.
//!
//! The index is written only by the replica set watch handler and read by the
//! placement and decision mappers while reconciliations are running, so every
//! access goes through an `RwLock`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::controller::keys::{own_key, QueueKey};
use crate::crd::WorkReplicaSet;

/// Index key of a placement
pub fn placement_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Index keys a replica set should appear under.
///
/// Placement refs resolve in the replica set's own namespace. Refs with an
/// empty name are left out.
pub fn index_keys(rs: &WorkReplicaSet) -> Vec<String> {
    let Some(namespace) = rs.metadata.namespace.as_deref() else {
        return Vec::new();
    };
    let mut keys: Vec<String> = Vec::new();
    for placement_ref in rs.valid_placement_refs() {
        let key = placement_key(namespace, &placement_ref.name);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[derive(Debug, Default)]
struct IndexState {
    by_placement: HashMap<String, BTreeSet<QueueKey>>,
    by_replica_set: HashMap<QueueKey, Vec<String>>,
}

impl IndexState {
    fn remove_key(&mut self, key: &QueueKey) {
        let Some(placements) = self.by_replica_set.remove(key) else {
            return;
        };
        for placement in placements {
            if let Some(keys) = self.by_placement.get_mut(&placement) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_placement.remove(&placement);
                }
            }
        }
    }

    fn insert(&mut self, key: QueueKey, placements: Vec<String>) {
        self.remove_key(&key);
        if placements.is_empty() {
            return;
        }
        for placement in &placements {
            self.by_placement
                .entry(placement.clone())
                .or_default()
                .insert(key.clone());
        }
        self.by_replica_set.insert(key, placements);
    }
}

/// Concurrent placement → replica set index
#[derive(Debug, Default)]
pub struct PlacementIndex {
    state: RwLock<IndexState>,
}

impl PlacementIndex {
    /// Index (or re-index) a replica set. Re-indexing an unchanged object is a no-op.
    pub fn upsert(&self, rs: &WorkReplicaSet) {
        let Some(key) = own_key(rs) else {
            return;
        };
        let placements = index_keys(rs);
        self.write().insert(key, placements);
    }

    /// Drop a replica set from the index
    pub fn remove(&self, rs: &WorkReplicaSet) {
        if let Some(key) = own_key(rs) {
            self.write().remove_key(&key);
        }
    }

    /// Replace the whole index, used after the watch re-lists
    pub fn replace_all<'a>(&self, replica_sets: impl IntoIterator<Item = &'a WorkReplicaSet>) {
        let mut fresh = IndexState::default();
        for rs in replica_sets {
            if let Some(key) = own_key(rs) {
                fresh.insert(key, index_keys(rs));
            }
        }
        *self.write() = fresh;
    }

    /// Replica sets referencing the placement, in key order
    pub fn lookup(&self, placement_key: &str) -> Vec<QueueKey> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_placement
            .get(placement_key)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of indexed replica sets
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_replica_set
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
