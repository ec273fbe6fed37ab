//! # Placement Index Watch
//!
//! Keeps the [`PlacementIndex`] in step with `WorkReplicaSet` watch events.
//!
//! The index is the only source the placement and decision mappers consult, so
//! the readiness probe stays red until the first full list has been applied.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{debug, info, warn};

use crate::config::SharedControllerConfig;
use crate::controller::index::PlacementIndex;
use crate::controller::server::ServerState;
use crate::crd::WorkReplicaSet;
use crate::observability;
use crate::runtime::error_policy::StreamErrorPolicy;

/// Applies watch events to the index, buffering re-lists
///
/// A re-list (`Init` .. `InitDone`) replaces the index wholesale so that
/// replica sets deleted while the watch was down are dropped.
#[derive(Debug, Default)]
pub struct IndexUpdater {
    relist: Option<Vec<WorkReplicaSet>>,
}

impl IndexUpdater {
    /// Apply one event; returns `true` when a full list has just been committed
    pub fn apply(&mut self, index: &PlacementIndex, event: watcher::Event<WorkReplicaSet>) -> bool {
        let committed = match event {
            watcher::Event::Apply(rs) => {
                index.upsert(&rs);
                false
            }
            watcher::Event::Delete(rs) => {
                index.remove(&rs);
                false
            }
            watcher::Event::Init => {
                self.relist = Some(Vec::new());
                false
            }
            watcher::Event::InitApply(rs) => {
                self.relist.get_or_insert_with(Vec::new).push(rs);
                false
            }
            watcher::Event::InitDone => {
                let listed = self.relist.take().unwrap_or_default();
                index.replace_all(&listed);
                true
            }
        };
        observability::metrics::set_index_replica_sets(index.len());
        committed
    }
}

/// Watch every `WorkReplicaSet` and feed the index until the task is aborted
pub async fn run_index_watch(
    client: Client,
    index: Arc<PlacementIndex>,
    server_state: Arc<ServerState>,
    config: SharedControllerConfig,
) {
    let api: Api<WorkReplicaSet> = Api::all(client);
    let mut updater = IndexUpdater::default();
    let stream_errors = StreamErrorPolicy::new(config);

    let mut events = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                stream_errors.reset();
                if updater.apply(&index, event) {
                    if !server_state.is_ready.load(Ordering::Relaxed) {
                        info!(replica_sets = index.len(), "placement index synced, controller ready");
                    } else {
                        debug!(replica_sets = index.len(), "placement index re-listed");
                    }
                    server_state.mark_ready(true);
                }
            }
            Err(e) => {
                stream_errors.handle(&e.to_string()).await;
            }
        }
    }
    warn!("placement index watch ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PlacementRef, WorkReplicaSetSpec};

    fn replica_set(name: &str, placements: &[&str]) -> WorkReplicaSet {
        let mut rs = WorkReplicaSet::new(
            name,
            WorkReplicaSetSpec {
                placement_refs: placements
                    .iter()
                    .map(|p| PlacementRef {
                        name: (*p).to_string(),
                        ..PlacementRef::default()
                    })
                    .collect(),
                ..WorkReplicaSetSpec::default()
            },
        );
        rs.metadata.namespace = Some("ns1".to_string());
        rs
    }

    #[test]
    fn test_apply_and_delete_events() {
        let index = PlacementIndex::default();
        let mut updater = IndexUpdater::default();

        assert!(!updater.apply(&index, watcher::Event::Apply(replica_set("app", &["p1"]))));
        assert_eq!(index.lookup("ns1/p1").len(), 1);

        assert!(!updater.apply(&index, watcher::Event::Delete(replica_set("app", &["p1"]))));
        assert!(index.lookup("ns1/p1").is_empty());
    }

    #[test]
    fn test_relist_replaces_index() {
        let index = PlacementIndex::default();
        let mut updater = IndexUpdater::default();
        updater.apply(&index, watcher::Event::Apply(replica_set("stale", &["p1"])));

        updater.apply(&index, watcher::Event::Init);
        updater.apply(&index, watcher::Event::InitApply(replica_set("app", &["p2"])));
        // Not visible until the list completes
        assert!(index.lookup("ns1/p2").is_empty());
        assert!(updater.apply(&index, watcher::Event::InitDone));

        assert!(index.lookup("ns1/p1").is_empty());
        assert_eq!(index.lookup("ns1/p2").len(), 1);
        assert_eq!(index.len(), 1);
    }
}
