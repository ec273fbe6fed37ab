//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Label on a `DeliveryWork` pointing back at its owning `WorkReplicaSet`.
/// Value format: `<namespace>.<name>`
pub const REPLICA_SET_LABEL: &str = "work.fleet.dev/replicaset";

/// Label on a `DeliveryWork` naming the placement that selected its target
pub const PLACEMENT_LABEL: &str = "work.fleet.dev/placement";

/// Annotation on a `DeliveryWork` carrying the hash of its desired spec
pub const SPEC_HASH_ANNOTATION: &str = "work.fleet.dev/spec-hash";

/// Label on a `PlacementDecision` naming the `Placement` it belongs to
pub const PLACEMENT_DECISION_LABEL: &str = "cluster.fleet.dev/placement";

/// Finalizer guarding a `WorkReplicaSet` until all of its works are gone
pub const WORK_CLEANUP_FINALIZER: &str = "work.fleet.dev/work-cleanup";

/// Field manager used for every write the controller issues
pub const FIELD_MANAGER: &str = "workset-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default deadline for a single reconciliation pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Default periodic resync interval after a successful pass (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default number of keys reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: usize = 10;
