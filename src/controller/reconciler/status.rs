//! # Status Stage
//!
//! Recomputes the replica set status from the works that exist right now and
//! a fresh resolution of every placement ref.
//!
//! [`compute_status`] is pure: it never looks at the previous status, so the
//! same observed works always produce the same status. Only condition
//! transition times are carried over from the previous status, in a separate
//! step.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::warn;

use crate::controller::keys::own_key;
use crate::controller::reconciler::distribute::unique_refs;
use crate::controller::reconciler::pipeline::Stage;
use crate::controller::reconciler::types::{
    Context, PassState, StageError, StageKind, StageOutcome,
};
use crate::crd::{
    find_condition, Condition, DeliveryWork, ManifestWorkSummary,
    PlacementSummary, WorkReplicaSet, WorkReplicaSetStatus, WORK_CONDITION_APPLIED,
    WORK_CONDITION_AVAILABLE, WORK_CONDITION_DEGRADED, WORK_CONDITION_PROGRESSING,
};

pub const CONDITION_PLACEMENT_VERIFIED: &str = "PlacementVerified";
pub const CONDITION_MANIFESTWORK_APPLIED: &str = "ManifestworkApplied";
pub const CONDITION_PLACEMENT_ROLLED_OUT: &str = "PlacementRolledOut";

pub const REASON_AS_EXPECTED: &str = "AsExpected";
pub const REASON_NOT_AS_EXPECTED: &str = "NotAsExpected";
pub const REASON_PROCESSING: &str = "Processing";
pub const REASON_PLACEMENT_DECISION_NOT_FOUND: &str = "PlacementDecisionNotFound";
pub const REASON_PLACEMENT_DECISION_EMPTY: &str = "PlacementDecisionEmpty";
pub const REASON_COMPLETE: &str = "Complete";
pub const REASON_PROGRESSING: &str = "Progressing";

/// Fresh resolution of one placement ref
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementResolution {
    pub name: String,
    /// Selected clusters, or the error message when resolution failed
    pub result: Result<BTreeSet<String>, String>,
}

fn count<'a>(works: impl IntoIterator<Item = &'a DeliveryWork>) -> ManifestWorkSummary {
    let mut summary = ManifestWorkSummary::default();
    for work in works {
        summary.total += 1;
        summary.applied += i32::from(work.reports(WORK_CONDITION_APPLIED));
        summary.available += i32::from(work.reports(WORK_CONDITION_AVAILABLE));
        summary.degraded += i32::from(work.reports(WORK_CONDITION_DEGRADED));
        summary.progressing += i32::from(work.reports(WORK_CONDITION_PROGRESSING));
    }
    summary
}

fn len_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// Status derived from the observed works and the placement resolutions
pub fn compute_status(
    resource: &WorkReplicaSet,
    works: &[DeliveryWork],
    resolutions: &[PlacementResolution],
) -> WorkReplicaSetStatus {
    let live: Vec<&DeliveryWork> = works.iter().filter(|w| !w.is_deleting()).collect();
    let summary = count(live.iter().copied());

    let mut placement_summary = Vec::new();
    let mut selected: BTreeSet<&str> = BTreeSet::new();
    let mut failed: Vec<&str> = Vec::new();
    for resolution in resolutions {
        match &resolution.result {
            Ok(targets) => {
                selected.extend(targets.iter().map(String::as_str));
                placement_summary.push(PlacementSummary {
                    name: resolution.name.clone(),
                    resolved_targets: len_i32(targets.len()),
                    summary: count(
                        live.iter()
                            .copied()
                            .filter(|w| w.target().is_some_and(|t| targets.contains(t))),
                    ),
                });
            }
            Err(_) => failed.push(resolution.name.as_str()),
        }
    }

    let placement_verified = if !failed.is_empty() {
        Condition::new(
            CONDITION_PLACEMENT_VERIFIED,
            false,
            REASON_PLACEMENT_DECISION_NOT_FOUND,
            format!("placements could not be resolved: {}", failed.join(", ")),
        )
    } else if selected.is_empty() {
        Condition::new(
            CONDITION_PLACEMENT_VERIFIED,
            false,
            REASON_PLACEMENT_DECISION_EMPTY,
            "no cluster is selected by any placement",
        )
    } else {
        Condition::new(
            CONDITION_PLACEMENT_VERIFIED,
            true,
            REASON_AS_EXPECTED,
            format!("{} clusters selected", selected.len()),
        )
    };

    let manifestwork_applied = if summary.total == 0 {
        Condition::new(
            CONDITION_MANIFESTWORK_APPLIED,
            false,
            REASON_PROCESSING,
            "no works created yet",
        )
    } else if summary.applied == summary.total {
        Condition::new(
            CONDITION_MANIFESTWORK_APPLIED,
            true,
            REASON_AS_EXPECTED,
            format!("{} of {} works applied", summary.applied, summary.total),
        )
    } else {
        Condition::new(
            CONDITION_MANIFESTWORK_APPLIED,
            false,
            REASON_NOT_AS_EXPECTED,
            format!("{} of {} works applied", summary.applied, summary.total),
        )
    };

    let available_targets = live
        .iter()
        .filter(|w| w.reports(WORK_CONDITION_AVAILABLE))
        .filter_map(|w| w.target())
        .collect::<BTreeSet<_>>();
    let rolled_out = !selected.is_empty() && selected.is_subset(&available_targets);
    let placement_rolled_out = if rolled_out {
        Condition::new(
            CONDITION_PLACEMENT_ROLLED_OUT,
            true,
            REASON_COMPLETE,
            "every selected cluster is available",
        )
    } else {
        Condition::new(
            CONDITION_PLACEMENT_ROLLED_OUT,
            false,
            REASON_PROGRESSING,
            format!(
                "{} of {} selected clusters available",
                selected.intersection(&available_targets).count(),
                selected.len()
            ),
        )
    };

    WorkReplicaSetStatus {
        conditions: vec![placement_verified, manifestwork_applied, placement_rolled_out],
        summary,
        placement_summary,
        observed_generation: resource.metadata.generation,
    }
}

/// Carry `lastTransitionTime` over for conditions whose status did not change
pub fn stamp_transitions(
    previous: Option<&WorkReplicaSetStatus>,
    status: &mut WorkReplicaSetStatus,
    now: &str,
) {
    for condition in &mut status.conditions {
        let carried = previous
            .and_then(|p| find_condition(&p.conditions, &condition.r#type))
            .filter(|old| old.status == condition.status)
            .and_then(|old| old.last_transition_time.clone());
        condition.last_transition_time = Some(carried.unwrap_or_else(|| now.to_string()));
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusStage;

#[async_trait]
impl Stage for StatusStage {
    fn kind(&self) -> StageKind {
        StageKind::Status
    }

    async fn reconcile(
        &self,
        ctx: &Context,
        mut resource: WorkReplicaSet,
        _pass: &mut PassState,
    ) -> StageOutcome {
        let Some(owner) = own_key(&resource) else {
            return StageOutcome::proceed(resource);
        };

        let works = match ctx.store.list_works(&owner).await {
            Ok(works) => works,
            Err(e) => {
                // Keep the last computed status rather than publishing a guess
                warn!(resource = %owner, error = %e, "failed to list works, status left as is");
                return StageOutcome::proceed(resource)
                    .with_error(StageError::new(StageKind::Status, None, e));
            }
        };

        let mut resolutions = Vec::new();
        for placement in unique_refs(&resource) {
            let result = ctx
                .resolver
                .resolve(&owner.namespace, &placement.name)
                .await
                .map_err(|e| e.to_string());
            resolutions.push(PlacementResolution {
                name: placement.name,
                result,
            });
        }

        let mut status = compute_status(&resource, &works, &resolutions);
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        stamp_transitions(resource.status.as_ref(), &mut status, &now);
        resource.status = Some(status);
        StageOutcome::proceed(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DeliveryWorkSpec, DeliveryWorkStatus, WorkReplicaSetSpec};

    fn replica_set() -> WorkReplicaSet {
        let mut rs = WorkReplicaSet::new("app", WorkReplicaSetSpec::default());
        rs.metadata.namespace = Some("ns1".to_string());
        rs.metadata.generation = Some(4);
        rs
    }

    fn work(target: &str, conditions: &[&str]) -> DeliveryWork {
        let mut work = DeliveryWork::new("app", DeliveryWorkSpec::default());
        work.metadata.namespace = Some(target.to_string());
        work.status = Some(DeliveryWorkStatus {
            conditions: conditions
                .iter()
                .map(|c| Condition::new(c, true, "Reported", ""))
                .collect(),
        });
        work
    }

    fn resolved(name: &str, targets: &[&str]) -> PlacementResolution {
        PlacementResolution {
            name: name.to_string(),
            result: Ok(targets.iter().map(|t| (*t).to_string()).collect()),
        }
    }

    fn condition<'a>(status: &'a WorkReplicaSetStatus, condition_type: &str) -> &'a Condition {
        find_condition(&status.conditions, condition_type).unwrap()
    }

    #[test]
    fn test_summary_counts_conditions() {
        let works = vec![
            work("c1", &[WORK_CONDITION_APPLIED, WORK_CONDITION_AVAILABLE]),
            work("c2", &[WORK_CONDITION_APPLIED, WORK_CONDITION_PROGRESSING]),
            work("c3", &[WORK_CONDITION_DEGRADED]),
        ];
        let status = compute_status(&replica_set(), &works, &[resolved("p1", &["c1", "c2", "c3"])]);
        assert_eq!(
            status.summary,
            ManifestWorkSummary {
                total: 3,
                applied: 2,
                available: 1,
                degraded: 1,
                progressing: 1
            }
        );
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(condition(&status, CONDITION_MANIFESTWORK_APPLIED).reason.as_deref(), Some(REASON_NOT_AS_EXPECTED));
        assert_eq!(condition(&status, CONDITION_PLACEMENT_ROLLED_OUT).status, "False");
    }

    #[test]
    fn test_all_applied_and_available() {
        let works = vec![
            work("c1", &[WORK_CONDITION_APPLIED, WORK_CONDITION_AVAILABLE]),
            work("c2", &[WORK_CONDITION_APPLIED, WORK_CONDITION_AVAILABLE]),
        ];
        let status = compute_status(&replica_set(), &works, &[resolved("p1", &["c1", "c2"])]);
        for condition_type in [
            CONDITION_PLACEMENT_VERIFIED,
            CONDITION_MANIFESTWORK_APPLIED,
            CONDITION_PLACEMENT_ROLLED_OUT,
        ] {
            assert_eq!(condition(&status, condition_type).status, "True", "{condition_type}");
        }
    }

    #[test]
    fn test_placement_summary_only_for_resolved_refs() {
        let works = vec![work("c1", &[WORK_CONDITION_APPLIED]), work("c2", &[])];
        let resolutions = vec![
            resolved("p1", &["c1"]),
            PlacementResolution {
                name: "p2".to_string(),
                result: Err("timed out".to_string()),
            },
        ];
        let status = compute_status(&replica_set(), &works, &resolutions);

        assert_eq!(status.placement_summary.len(), 1);
        assert_eq!(status.placement_summary[0].name, "p1");
        assert_eq!(status.placement_summary[0].resolved_targets, 1);
        assert_eq!(status.placement_summary[0].summary.applied, 1);
        // Summary still covers every observed work
        assert_eq!(status.summary.total, 2);
        let verified = condition(&status, CONDITION_PLACEMENT_VERIFIED);
        assert_eq!(verified.reason.as_deref(), Some(REASON_PLACEMENT_DECISION_NOT_FOUND));
    }

    #[test]
    fn test_empty_selection() {
        let status = compute_status(&replica_set(), &[], &[resolved("p1", &[])]);
        assert_eq!(
            condition(&status, CONDITION_PLACEMENT_VERIFIED).reason.as_deref(),
            Some(REASON_PLACEMENT_DECISION_EMPTY)
        );
        assert_eq!(
            condition(&status, CONDITION_MANIFESTWORK_APPLIED).reason.as_deref(),
            Some(REASON_PROCESSING)
        );
        assert_eq!(status.summary, ManifestWorkSummary::default());
    }

    #[test]
    fn test_compute_status_is_pure() {
        let works = vec![work("c1", &[WORK_CONDITION_APPLIED])];
        let resolutions = vec![resolved("p1", &["c1"])];
        let mut with_history = replica_set();
        with_history.status = Some(WorkReplicaSetStatus {
            summary: ManifestWorkSummary {
                total: 99,
                ..ManifestWorkSummary::default()
            },
            ..WorkReplicaSetStatus::default()
        });

        let first = compute_status(&replica_set(), &works, &resolutions);
        let second = compute_status(&with_history, &works, &resolutions);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_stamp_transitions_carries_unchanged_conditions() {
        let works = vec![work("c1", &[WORK_CONDITION_APPLIED])];
        let resolutions = vec![resolved("p1", &["c1"])];
        let mut previous = compute_status(&replica_set(), &works, &resolutions);
        stamp_transitions(None, &mut previous, "2026-01-01T00:00:00Z");

        // c1 becomes available: only PlacementRolledOut flips
        let works = vec![work("c1", &[WORK_CONDITION_APPLIED, WORK_CONDITION_AVAILABLE])];
        let mut next = compute_status(&replica_set(), &works, &resolutions);
        stamp_transitions(Some(&previous), &mut next, "2026-02-01T00:00:00Z");

        assert_eq!(
            condition(&next, CONDITION_MANIFESTWORK_APPLIED).last_transition_time.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
        assert_eq!(
            condition(&next, CONDITION_PLACEMENT_ROLLED_OUT).last_transition_time.as_deref(),
            Some("2026-02-01T00:00:00Z")
        );
    }
}
