//! # Distribution Stage
//!
//! Converges the owned `DeliveryWork` objects onto the clusters selected by
//! the replica set's placements.
//!
//! ## Flow
//!
//! 1. Resolve every placement ref, in spec order. A ref that fails to resolve
//!    is skipped for this pass and its works are left alone.
//! 2. Build the desired work for every selected cluster. A cluster selected by
//!    several refs belongs to the first one.
//! 3. Diff against the observed works by content: create what is missing,
//!    update what drifted, delete what no resolved ref selects any more.
//!    The spec-hash annotation only records which template revision a work
//!    was last written from.
//! 4. Apply pending writes within each ref's rollout budget.
//!
//! A failure on one cluster never stops the others.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::{PLACEMENT_LABEL, REPLICA_SET_LABEL, SPEC_HASH_ANNOTATION};
use crate::controller::keys::{own_key, QueueKey};
use crate::controller::reconciler::pipeline::Stage;
use crate::controller::reconciler::rollout;
use crate::controller::reconciler::types::{
    Context, PassState, StageError, StageKind, StageOutcome, TargetOutcome,
};
use crate::crd::{
    DeliveryWork, DeliveryWorkSpec, ManifestConfig, ManifestTemplate, PlacementRef,
    UpdateStrategy, WorkReplicaSet,
};
use crate::observability;

/// Identity of a manifest inside a work: `apiVersion/kind/namespace/name`,
/// or its position when the manifest carries no name
pub fn manifest_identity(manifest: &Value, position: usize) -> String {
    let api_version = manifest.get("apiVersion").and_then(Value::as_str);
    let kind = manifest.get("kind").and_then(Value::as_str);
    let metadata = manifest.get("metadata");
    let name = metadata.and_then(|m| m.get("name")).and_then(Value::as_str);
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    match (api_version, kind, name) {
        (Some(api_version), Some(kind), Some(name)) => {
            format!("{api_version}/{kind}/{namespace}/{name}")
        }
        _ => format!("#{position}"),
    }
}

/// Work spec materialized from the templates
pub fn desired_spec(templates: &[ManifestTemplate]) -> DeliveryWorkSpec {
    DeliveryWorkSpec {
        manifests: templates.iter().map(|t| t.manifest.clone()).collect(),
        manifest_configs: templates
            .iter()
            .enumerate()
            .map(|(position, t)| ManifestConfig {
                identity: manifest_identity(&t.manifest, position),
                update_strategy: t.update_strategy,
            })
            .collect(),
    }
}

/// Hex SHA-256 of the serialized spec
pub fn spec_hash(spec: &DeliveryWorkSpec) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(spec)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Desired work for one target cluster
pub fn desired_work(
    owner: &QueueKey,
    target: &str,
    placement: &str,
    spec: DeliveryWorkSpec,
    hash: &str,
) -> DeliveryWork {
    let mut work = DeliveryWork::new(&owner.name, spec);
    work.metadata.namespace = Some(target.to_string());
    work.metadata.labels = Some(BTreeMap::from([
        (REPLICA_SET_LABEL.to_string(), owner.label_value()),
        (PLACEMENT_LABEL.to_string(), placement.to_string()),
    ]));
    work.metadata.annotations = Some(BTreeMap::from([(
        SPEC_HASH_ANNOTATION.to_string(),
        hash.to_string(),
    )]));
    work
}

/// Keep the delivered copy of every `CreateOnly` manifest that already exists
pub fn preserve_create_only(desired: &DeliveryWorkSpec, observed: &DeliveryWorkSpec) -> DeliveryWorkSpec {
    let delivered: HashMap<&str, &Value> = observed
        .manifest_configs
        .iter()
        .zip(&observed.manifests)
        .map(|(config, manifest)| (config.identity.as_str(), manifest))
        .collect();

    let manifests = desired
        .manifests
        .iter()
        .zip(&desired.manifest_configs)
        .map(|(manifest, config)| match config.update_strategy {
            UpdateStrategy::CreateOnly => delivered
                .get(config.identity.as_str())
                .map_or_else(|| manifest.clone(), |existing| (*existing).clone()),
            UpdateStrategy::Update => manifest.clone(),
        })
        .collect();

    DeliveryWorkSpec {
        manifests,
        manifest_configs: desired.manifest_configs.clone(),
    }
}

fn label<'a>(work: &'a DeliveryWork, key: &str) -> Option<&'a str> {
    work.labels().get(key).map(String::as_str)
}

#[cfg(test)]
fn annotation<'a>(work: &'a DeliveryWork, key: &str) -> Option<&'a str> {
    work.annotations().get(key).map(String::as_str)
}

/// Observed work already carries the desired content and labels.
///
/// The comparison runs on the spec itself, so edits made to a work behind
/// the controller's back are reverted. `CreateOnly` manifests are compared
/// against their delivered copy.
fn is_up_to_date(observed: &DeliveryWork, desired: &DeliveryWork) -> bool {
    preserve_create_only(&desired.spec, &observed.spec) == observed.spec
        && label(observed, PLACEMENT_LABEL) == label(desired, PLACEMENT_LABEL)
        && label(observed, REPLICA_SET_LABEL) == label(desired, REPLICA_SET_LABEL)
}

/// Observed work rewritten to the desired state, keeping its identity and foreign metadata
fn updated_work(observed: &DeliveryWork, desired: DeliveryWork) -> DeliveryWork {
    let mut work = observed.clone();
    work.spec = preserve_create_only(&desired.spec, &observed.spec);
    work.labels_mut().extend(desired.labels().clone());
    work.annotations_mut().extend(desired.annotations().clone());
    work
}

/// Placement ref together with its resolution for this pass; `None` means it failed
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    pub placement: PlacementRef,
    pub targets: Option<BTreeSet<String>>,
}

#[derive(Debug)]
pub enum Write {
    Create(DeliveryWork),
    Update(DeliveryWork),
}

impl Write {
    fn target(&self) -> String {
        match self {
            Write::Create(work) | Write::Update(work) => work.namespace().unwrap_or_default(),
        }
    }
}

/// Everything the stage intends to do, computed before any write
#[derive(Debug, Default)]
pub struct Plan {
    pub writes: Vec<Write>,
    pub unchanged: Vec<String>,
    pub deferred: Vec<String>,
    /// `(namespace, name)` of works to delete
    pub deletes: Vec<(String, String)>,
}

/// Compute the plan from the observed works and this pass' resolutions
pub fn plan(
    owner: &QueueKey,
    observed: &[DeliveryWork],
    resolved: &[ResolvedRef],
    spec: &DeliveryWorkSpec,
    hash: &str,
) -> Plan {
    let mut plan = Plan::default();
    let mut by_target: BTreeMap<String, &DeliveryWork> = BTreeMap::new();
    let mut strays: Vec<&DeliveryWork> = Vec::new();
    for work in observed {
        match work.metadata.namespace.as_deref() {
            Some(target) if work.name_any() == owner.name => {
                by_target.insert(target.to_string(), work);
            }
            _ => strays.push(work),
        }
    }

    let mut claimed: BTreeSet<String> = BTreeSet::new();
    for resolved_ref in resolved {
        let Some(targets) = &resolved_ref.targets else {
            continue;
        };
        let mut pending = Vec::new();
        let mut progressing = 0;
        for target in targets {
            if !claimed.insert(target.clone()) {
                continue;
            }
            let desired = desired_work(owner, target, &resolved_ref.placement.name, spec.clone(), hash);
            match by_target.get(target) {
                None => pending.push(Write::Create(desired)),
                Some(work) if work.is_deleting() => plan.deferred.push(target.clone()),
                Some(work) if is_up_to_date(work, &desired) => {
                    if rollout::is_progressing(work) {
                        progressing += 1;
                    }
                    plan.unchanged.push(target.clone());
                }
                Some(work) => pending.push(Write::Update(updated_work(work, desired))),
            }
        }

        let budget = rollout::budget(
            resolved_ref.placement.rollout_strategy,
            progressing,
            pending.len(),
        );
        for (position, write) in pending.into_iter().enumerate() {
            if position < budget {
                plan.writes.push(write);
            } else {
                plan.deferred.push(write.target());
            }
        }
    }

    let failed: BTreeSet<&str> = resolved
        .iter()
        .filter(|r| r.targets.is_none())
        .map(|r| r.placement.name.as_str())
        .collect();
    // Works of a placement that could not be resolved are kept until it resolves again
    let protected = |work: &DeliveryWork| match label(work, PLACEMENT_LABEL) {
        Some(placement) => failed.contains(placement),
        None => !failed.is_empty(),
    };

    for (target, work) in &by_target {
        if !claimed.contains(target) && !work.is_deleting() && !protected(work) {
            plan.deletes.push((target.clone(), work.name_any()));
        }
    }
    for work in strays {
        if !work.is_deleting() && !protected(work) {
            plan.deletes
                .push((work.namespace().unwrap_or_default(), work.name_any()));
        }
    }
    plan
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DistributionStage;

impl DistributionStage {
    async fn resolve(
        ctx: &Context,
        namespace: &str,
        refs: &[PlacementRef],
        errors: &mut Vec<StageError>,
    ) -> Vec<ResolvedRef> {
        let mut resolved = Vec::with_capacity(refs.len());
        for placement in refs {
            let targets = match ctx.resolver.resolve(namespace, &placement.name).await {
                Ok(targets) => Some(targets),
                Err(e) => {
                    warn!(placement = %placement.name, error = %e, "placement resolution failed");
                    errors.push(StageError::new(StageKind::Distribution, None, e));
                    None
                }
            };
            resolved.push(ResolvedRef {
                placement: placement.clone(),
                targets,
            });
        }
        resolved
    }
}

/// Valid placement refs, first occurrence of each name only
pub fn unique_refs(resource: &WorkReplicaSet) -> Vec<PlacementRef> {
    let mut seen = BTreeSet::new();
    resource
        .valid_placement_refs()
        .filter(|r| seen.insert(r.name.clone()))
        .cloned()
        .collect()
}

#[async_trait]
impl Stage for DistributionStage {
    fn kind(&self) -> StageKind {
        StageKind::Distribution
    }

    async fn reconcile(
        &self,
        ctx: &Context,
        resource: WorkReplicaSet,
        pass: &mut PassState,
    ) -> StageOutcome {
        if resource.is_deleting() {
            return StageOutcome::proceed(resource);
        }
        let Some(owner) = own_key(&resource) else {
            return StageOutcome::proceed(resource);
        };
        if !resource.has_cleanup_finalizer() {
            debug!(resource = %owner, "cleanup finalizer missing, not distributing");
            return StageOutcome::proceed(resource);
        }

        let mut errors = Vec::new();
        let observed = match ctx.store.list_works(&owner).await {
            Ok(works) => works,
            Err(e) => {
                return StageOutcome::proceed(resource)
                    .with_error(StageError::new(StageKind::Distribution, None, e));
            }
        };
        let spec = desired_spec(&resource.spec.manifest_templates);
        let hash = match spec_hash(&spec) {
            Ok(hash) => hash,
            Err(e) => {
                return StageOutcome::proceed(resource)
                    .with_error(StageError::new(StageKind::Distribution, None, e));
            }
        };

        let refs = unique_refs(&resource);
        let resolved = Self::resolve(ctx, &owner.namespace, &refs, &mut errors).await;
        let plan = plan(&owner, &observed, &resolved, &spec, &hash);

        for target in &plan.unchanged {
            pass.record(target, TargetOutcome::Unchanged);
        }
        for target in &plan.deferred {
            pass.record(target, TargetOutcome::Deferred);
        }

        for write in &plan.writes {
            let target = write.target();
            let (result, operation, done) = match write {
                Write::Create(work) => (
                    ctx.store.create_work(work).await,
                    "create",
                    TargetOutcome::Created,
                ),
                Write::Update(work) => (
                    ctx.store.update_work(work).await,
                    "update",
                    TargetOutcome::Updated,
                ),
            };
            match result {
                Ok(_) => {
                    observability::metrics::increment_work_operations(operation);
                    pass.record(&target, done);
                }
                Err(e) => {
                    warn!(resource = %owner, target = %target, operation, error = %e, "work write failed");
                    pass.record(&target, TargetOutcome::Failed);
                    errors.push(StageError::new(StageKind::Distribution, Some(target.as_str()), e));
                }
            }
        }

        for (namespace, name) in &plan.deletes {
            match ctx.store.delete_work(namespace, name).await {
                Ok(()) => {
                    observability::metrics::increment_work_operations("delete");
                    pass.record(namespace, TargetOutcome::Deleted);
                }
                Err(e) => {
                    warn!(resource = %owner, target = %namespace, error = %e, "work delete failed");
                    pass.record(namespace, TargetOutcome::Failed);
                    errors.push(StageError::new(StageKind::Distribution, Some(namespace.as_str()), e));
                }
            }
        }

        if pass.writes() > 0 || !plan.deferred.is_empty() {
            info!(
                resource = %owner,
                created = pass.count(TargetOutcome::Created),
                updated = pass.count(TargetOutcome::Updated),
                deleted = pass.count(TargetOutcome::Deleted),
                deferred = pass.count(TargetOutcome::Deferred),
                failed = pass.count(TargetOutcome::Failed),
                "distributed works"
            );
        }
        StageOutcome::proceed(resource).with_errors(errors)
    }
}
