//! # Reconciler
//!
//! Reconciliation of `WorkReplicaSet` resources.
//!
//! ## Module Structure
//!
//! - `types.rs` - Context, signals, pass accumulator and errors
//! - `pipeline.rs` - `Stage` trait and the ordered stage list
//! - `finalize.rs` - Cleanup of owned works on deletion
//! - `guard.rs` - Installs the cleanup finalizer
//! - `distribute.rs` - Creates, updates and deletes per-cluster works
//! - `rollout.rs` - Rollout budget helpers
//! - `status.rs` - Recomputes the aggregated status
//! - `sync.rs` - Entry point for one queue key

pub mod distribute;
pub mod finalize;
pub mod guard;
pub mod pipeline;
pub mod rollout;
pub mod status;
pub mod sync;
pub mod types;

pub use pipeline::{Pipeline, Stage};
pub use status::compute_status;
pub use sync::{sync, sync_replica_set};
pub use types::{
    Context, PassState, ReconcilerError, Signal, StageError, StageFailure, StageKind,
    StageOutcome, SyncError, TargetOutcome,
};
