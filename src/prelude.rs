//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use workset_controller::prelude::*;
//! ```

// CRD types - most commonly used
pub use crate::crd::*;

// Seams between the reconciler and the API server
pub use crate::placement::{KubePlacementResolver, PlacementResolver, ResolveError, StaticPlacementResolver};
pub use crate::store::{KubeWorkStore, MemoryStore, StoreError, WorkStore};

// Reconciler types - core controller functionality
pub use crate::controller::index::PlacementIndex;
pub use crate::controller::keys::QueueKey;
pub use crate::controller::reconciler::{
    sync, Context, Pipeline, ReconcilerError, StageError, StageKind, SyncError,
};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, SharedControllerConfig};
