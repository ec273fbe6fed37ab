//! # Custom Resource Definitions
//!
//! CRD types for the Work Replica Set Controller.
//!
//! ## Module Structure
//!
//! - `replica_set.rs` - `WorkReplicaSet`, the owning resource, and its spec types
//! - `status.rs` - Status types for the owning resource and shared `Condition`
//! - `work.rs` - `DeliveryWork`, the per-target delivery object
//! - `placement.rs` - `Placement` and `PlacementDecision`, consumed read-only
//! - `schema.rs` - Schema helpers for opaque manifest payloads

mod placement;
mod replica_set;
mod schema;
mod status;
mod work;

// Re-export all public types
pub use placement::{ClusterDecision, Placement, PlacementDecision, PlacementDecisionSpec,
    PlacementDecisionStatus, PlacementSpec};
pub use replica_set::{
    ManifestTemplate, PlacementRef, RolloutStrategy, UpdateStrategy, WorkReplicaSet,
    WorkReplicaSetSpec,
};
pub use status::{
    condition_status, find_condition, is_condition_true, Condition, ManifestWorkSummary,
    PlacementSummary, WorkReplicaSetStatus,
};
pub use work::{
    DeliveryWork, DeliveryWorkSpec, DeliveryWorkStatus, ManifestConfig, WORK_CONDITION_APPLIED,
    WORK_CONDITION_AVAILABLE, WORK_CONDITION_DEGRADED, WORK_CONDITION_PROGRESSING,
};
