//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `workset_reconciliations_total` - Total number of reconciliation passes
//! - `workset_reconciliation_errors_total` - Total number of failed passes
//! - `workset_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `workset_work_operations_total` - DeliveryWork writes by operation (create/update/delete)
//! - `workset_stage_errors_total` - Errors reported by pipeline stage
//! - `workset_requeues_total` - Requeues by reason
//! - `workset_index_replica_sets` - Replica sets currently in the placement index
//! - `workset_status_patches_total` - Status patches written

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "workset_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "workset_reconciliation_errors_total",
        "Total number of reconciliation passes that returned an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "workset_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static WORK_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "workset_work_operations_total",
            "Total number of DeliveryWork writes by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create WORK_OPERATIONS_TOTAL metric - this should never happen")
});

static STAGE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "workset_stage_errors_total",
            "Total number of errors reported by each pipeline stage",
        ),
        &["stage"],
    )
    .expect("Failed to create STAGE_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("workset_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static INDEX_REPLICA_SETS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "workset_index_replica_sets",
        "Number of replica sets tracked by the placement index",
    )
    .expect("Failed to create INDEX_REPLICA_SETS metric - this should never happen")
});

static STATUS_PATCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "workset_status_patches_total",
        "Total number of status patches written",
    )
    .expect("Failed to create STATUS_PATCHES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(WORK_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STAGE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INDEX_REPLICA_SETS.clone()))?;
    REGISTRY.register(Box::new(STATUS_PATCHES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// `operation` is one of `create`, `update`, `delete`
pub fn increment_work_operations(operation: &str) {
    WORK_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_stage_errors(stage: &str) {
    STAGE_ERRORS_TOTAL.with_label_values(&[stage]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_index_replica_sets(count: usize) {
    INDEX_REPLICA_SETS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_status_patches() {
    STATUS_PATCHES_TOTAL.inc();
}
