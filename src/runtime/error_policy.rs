//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles failed passes and watch stream errors.

use crate::config::SharedControllerConfig;
use crate::controller::keys::own_key;
use crate::controller::reconciler::{Context, ReconcilerError};
use crate::crd::WorkReplicaSet;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a key whose pass returned an error, with per-key exponential backoff
///
/// The backoff state lives in the context and is reset by the next clean pass,
/// so one failing replica set never slows down the others.
pub fn handle_reconciliation_error(
    obj: Arc<WorkReplicaSet>,
    error: &ReconcilerError,
    ctx: Arc<Context>,
) -> Action {
    let Some(key) = own_key(&obj) else {
        return Action::await_change();
    };

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", key, error);
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = ctx.next_backoff(&key);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        error_count,
        next_retry = %next_trigger_time.to_rfc3339(),
        "retrying with exponential backoff (trigger source: error-backoff)"
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version expired, the watch re-lists
    Expired,
    /// 429: API server storage reinitializing or throttling
    Throttled,
    /// 404: a watched CRD is missing
    NotFound,
    Other,
}

impl WatchErrorKind {
    pub fn classify(error: &str) -> Self {
        // 404 first: a plain-text 404 body surfaces as a decode error mentioning WatchFailed
        let is_not_found =
            error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
        if is_not_found {
            WatchErrorKind::NotFound
        } else if error.contains("401") || error.contains("Unauthorized") {
            WatchErrorKind::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            WatchErrorKind::Expired
        } else if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            WatchErrorKind::Throttled
        } else {
            WatchErrorKind::Other
        }
    }
}

/// Watch stream error handling bound to the controller configuration
///
/// Holds the throttling backoff of one watch stream; every delay comes from
/// the shared [`ControllerConfig`](crate::config::ControllerConfig).
#[derive(Debug)]
pub struct StreamErrorPolicy {
    config: SharedControllerConfig,
    backoff: AtomicU64,
}

impl StreamErrorPolicy {
    pub fn new(config: SharedControllerConfig) -> Self {
        let backoff = AtomicU64::new(config.backoff_start_ms);
        Self { config, backoff }
    }

    /// Classify `error`, sleeping and growing the backoff as its class requires
    pub async fn handle(&self, error: &str) -> WatchErrorKind {
        handle_watch_stream_error(
            error,
            &self.backoff,
            self.config.backoff_max_ms,
            self.config.watch_restart_delay_duration(),
        )
        .await
    }

    /// Back to the configured start after a healthy event
    pub fn reset(&self) {
        self.backoff
            .store(self.config.backoff_start_ms, Ordering::Relaxed);
    }

    pub fn current_backoff_ms(&self) -> u64 {
        self.backoff.load(Ordering::Relaxed)
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Sleeps where the error class calls for it; the throttling backoff doubles
/// up to `max_backoff_ms` and is reset by the caller on the next healthy event.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> WatchErrorKind {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    let kind = WatchErrorKind::classify(error_string);
    match kind {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("SRE Diagnostics:");
            error!("   1. Verify ClusterRole 'workset-controller' still exists:");
            error!("      kubectl get clusterrole workset-controller");
            error!("   2. Verify RBAC permissions are still active:");
            error!("      kubectl auth can-i watch workreplicasets.work.fleet.dev --as=system:serviceaccount:<namespace>:workset-controller --all-namespaces");
            error!("      kubectl auth can-i watch deliveryworks.work.fleet.dev --as=system:serviceaccount:<namespace>:workset-controller --all-namespaces");
            error!("      kubectl auth can-i watch placementdecisions.cluster.fleet.dev --as=system:serviceaccount:<namespace>:workset-controller --all-namespaces");
            warn!(
                "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "watch resource version expired, watch will re-list");
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Watched resource not found (404) - is every CRD installed? Error: {}",
                error_string
            );
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
        }
    }
    kind
}
