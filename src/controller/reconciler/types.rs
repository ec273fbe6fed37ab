//! # Types
//!
//! Core types for the reconciler: the shared context, stage signals, the
//! per-pass accumulator and the error taxonomy.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::config::SharedControllerConfig;
use crate::controller::backoff::BackoffState;
use crate::controller::index::PlacementIndex;
use crate::controller::keys::QueueKey;
use crate::crd::WorkReplicaSet;
use crate::placement::{PlacementResolver, ResolveError};
use crate::store::{StoreError, WorkStore};

/// Where in a pass an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Loading the replica set before the pipeline runs
    Load,
    Finalize,
    GuardInstall,
    Distribution,
    Status,
    /// Persisting the recomputed status after the pipeline
    StatusPatch,
}

impl StageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Load => "load",
            StageKind::Finalize => "finalize",
            StageKind::GuardInstall => "guard-install",
            StageKind::Distribution => "distribution",
            StageKind::Status => "status",
            StageKind::StatusPatch => "status-patch",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage tells the pipeline after running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Stop,
}

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A single failure inside a pass, attributed to a stage and optionally a target
#[derive(Debug, Error)]
#[error("{stage}{}: {source}", describe_target(.target))]
pub struct StageError {
    pub stage: StageKind,
    pub target: Option<String>,
    #[source]
    pub source: StageFailure,
}

fn describe_target(target: &Option<String>) -> String {
    target
        .as_deref()
        .map(|t| format!(" (target {t})"))
        .unwrap_or_default()
}

impl StageError {
    pub fn new(stage: StageKind, target: Option<&str>, source: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            target: target.map(str::to_string),
            source: source.into(),
        }
    }
}

/// Result of running one stage
#[derive(Debug)]
pub struct StageOutcome {
    pub resource: WorkReplicaSet,
    pub signal: Signal,
    pub errors: Vec<StageError>,
}

impl StageOutcome {
    pub fn proceed(resource: WorkReplicaSet) -> Self {
        Self {
            resource,
            signal: Signal::Continue,
            errors: Vec::new(),
        }
    }

    pub fn stop(resource: WorkReplicaSet) -> Self {
        Self {
            resource,
            signal: Signal::Stop,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<StageError>) -> Self {
        self.errors = errors;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: StageError) -> Self {
        self.errors.push(error);
        self
    }
}

/// Per-target result of the distribution stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
    /// Pending, held back by the rollout strategy or a work still being deleted
    Deferred,
    Failed,
}

impl TargetOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOutcome::Created => "created",
            TargetOutcome::Updated => "updated",
            TargetOutcome::Deleted => "deleted",
            TargetOutcome::Unchanged => "unchanged",
            TargetOutcome::Deferred => "deferred",
            TargetOutcome::Failed => "failed",
        }
    }
}

/// Accumulator threaded through every stage of one pass
#[derive(Debug, Default)]
pub struct PassState {
    /// Errors in the order stages reported them
    pub errors: Vec<StageError>,
    /// Distribution result per target cluster
    pub outcomes: BTreeMap<String, TargetOutcome>,
    /// Stage that halted the pipeline, if any
    pub stopped_by: Option<StageKind>,
}

impl PassState {
    pub fn record(&mut self, target: &str, outcome: TargetOutcome) {
        self.outcomes.insert(target.to_string(), outcome);
    }

    pub fn outcome(&self, target: &str) -> Option<TargetOutcome> {
        self.outcomes.get(target).copied()
    }

    /// Number of targets that ended the pass with `outcome`
    pub fn count(&self, outcome: TargetOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }

    /// Number of writes issued against works during the pass
    pub fn writes(&self) -> usize {
        self.count(TargetOutcome::Created)
            + self.count(TargetOutcome::Updated)
            + self.count(TargetOutcome::Deleted)
    }
}

fn join_errors(errors: &[StageError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<StageError>),
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

impl SyncError {
    /// Individual errors, empty for a timeout
    pub fn errors(&self) -> &[StageError] {
        match self {
            SyncError::Aggregate(errors) => errors,
            SyncError::Timeout(_) => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    SyncFailed(#[from] SyncError),
}

/// Shared state handed to every reconciliation
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn WorkStore>,
    pub resolver: Arc<dyn PlacementResolver>,
    /// Read by the watch mappers; written only by the index watch task
    pub index: Arc<PlacementIndex>,
    pub config: SharedControllerConfig,
    // Backoff state per resource (identified by namespace/name), owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        store: Arc<dyn WorkStore>,
        resolver: Arc<dyn PlacementResolver>,
        index: Arc<PlacementIndex>,
        config: SharedControllerConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            index,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Advance the backoff of `key`, returning the delay and the consecutive error count
    pub fn next_backoff(&self, key: &QueueKey) -> (Duration, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(|| {
            BackoffState::new(self.config.backoff_start_ms, self.config.backoff_max_ms)
        });
        state.increment_error();
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Forget the backoff of `key`; returns whether it was backing off
    pub fn reset_backoff(&self, key: &QueueKey) -> bool {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.to_string())
            .is_some_and(|state| state.error_count > 0)
    }
}
