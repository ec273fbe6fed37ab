//! # Placement Resolution
//!
//! Turns a placement reference into the set of target clusters it currently
//! selects. The controller never evaluates placement policy itself; it reads
//! the `PlacementDecision` objects the scheduler wrote for the placement and
//! unions their cluster names.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::Client;
use thiserror::Error;
use tracing::debug;

use crate::constants::PLACEMENT_DECISION_LABEL;
use crate::crd::{Placement, PlacementDecision};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("placement {namespace}/{name} not found")]
    PlacementNotFound { namespace: String, name: String },
    #[error("Kubernetes API error resolving placement: {0}")]
    Api(#[from] kube::Error),
}

/// Resolves a placement to the clusters it selects
#[async_trait]
pub trait PlacementResolver: Send + Sync {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<BTreeSet<String>, ResolveError>;
}

/// Reads `Placement` and `PlacementDecision` objects from the API server
#[derive(Clone)]
pub struct KubePlacementResolver {
    client: Client,
}

impl std::fmt::Debug for KubePlacementResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePlacementResolver").finish_non_exhaustive()
    }
}

impl KubePlacementResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlacementResolver for KubePlacementResolver {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<BTreeSet<String>, ResolveError> {
        let placements: Api<Placement> = Api::namespaced(self.client.clone(), namespace);
        if placements.get_opt(name).await?.is_none() {
            return Err(ResolveError::PlacementNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let decisions: Api<PlacementDecision> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("{PLACEMENT_DECISION_LABEL}={name}"));
        let list = decisions.list(&params).await?;
        let clusters = union_clusters(&list.items);
        debug!(
            placement.namespace = %namespace,
            placement.name = %name,
            decisions = list.items.len(),
            clusters = clusters.len(),
            "resolved placement"
        );
        Ok(clusters)
    }
}

/// Union of the cluster names over every decision slice
pub fn union_clusters(decisions: &[PlacementDecision]) -> BTreeSet<String> {
    decisions
        .iter()
        .flat_map(PlacementDecision::cluster_names)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
enum Entry {
    Clusters(BTreeSet<String>),
    Failing(String),
}

/// In-memory resolver with fixed answers per placement.
///
/// Unknown placements resolve to `PlacementNotFound`, as they would against an
/// API server.
#[derive(Debug, Default)]
pub struct StaticPlacementResolver {
    entries: Mutex<BTreeMap<(String, String), Entry>>,
}

impl StaticPlacementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the clusters a placement selects
    pub fn set<I, S>(&self, namespace: &str, name: &str, clusters: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clusters = clusters.into_iter().map(Into::into).collect();
        self.lock().insert(
            (namespace.to_string(), name.to_string()),
            Entry::Clusters(clusters),
        );
    }

    /// Make resolution of a placement fail with a timeout-like API error
    pub fn fail(&self, namespace: &str, name: &str, message: &str) {
        self.lock().insert(
            (namespace.to_string(), name.to_string()),
            Entry::Failing(message.to_string()),
        );
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.lock().remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait]
impl PlacementResolver for StaticPlacementResolver {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<BTreeSet<String>, ResolveError> {
        match self.lock().get(&(namespace.to_string(), name.to_string())) {
            Some(Entry::Clusters(clusters)) => Ok(clusters.clone()),
            Some(Entry::Failing(message)) => Err(ResolveError::Api(kube::Error::Service(
                message.clone().into(),
            ))),
            None => Err(ResolveError::PlacementNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ClusterDecision, PlacementDecisionSpec, PlacementDecisionStatus};

    fn decision(clusters: &[&str]) -> PlacementDecision {
        let mut decision = PlacementDecision::new("p1-decision-1", PlacementDecisionSpec::default());
        decision.status = Some(PlacementDecisionStatus {
            decisions: clusters
                .iter()
                .map(|c| ClusterDecision {
                    cluster_name: (*c).to_string(),
                    reason: String::new(),
                })
                .collect(),
        });
        decision
    }

    #[test]
    fn test_union_clusters_across_slices() {
        let decisions = vec![decision(&["c2", "c1"]), decision(&["c3", "c1", ""])];
        let clusters: Vec<String> = union_clusters(&decisions).into_iter().collect();
        assert_eq!(clusters, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_union_clusters_without_status() {
        let decision = PlacementDecision::new("p1-decision-1", PlacementDecisionSpec::default());
        assert!(union_clusters(&[decision]).is_empty());
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticPlacementResolver::new();
        resolver.set("ns1", "p1", ["c1", "c2"]);
        let clusters = resolver.resolve("ns1", "p1").await.unwrap();
        assert_eq!(clusters.len(), 2);

        assert!(matches!(
            resolver.resolve("ns1", "missing").await,
            Err(ResolveError::PlacementNotFound { .. })
        ));

        resolver.fail("ns1", "p1", "decision list timed out");
        assert!(matches!(
            resolver.resolve("ns1", "p1").await,
            Err(ResolveError::Api(_))
        ));
    }
}
