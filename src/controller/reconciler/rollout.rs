//! # Rollout
//!
//! Pacing of pending writes across the clusters selected by one placement.

use crate::crd::{DeliveryWork, RolloutStrategy, WORK_CONDITION_AVAILABLE};

/// How many of `pending` targets may be written this pass.
///
/// `progressing` counts works that already carry the desired content but are
/// not Available yet; under a progressive strategy they use up the budget.
/// A `maxConcurrency` of zero is treated as one so a rollout always advances.
pub fn budget(strategy: RolloutStrategy, progressing: usize, pending: usize) -> usize {
    match strategy {
        RolloutStrategy::All => pending,
        RolloutStrategy::Progressive { max_concurrency } => {
            let limit = usize::try_from(max_concurrency.max(1)).unwrap_or(usize::MAX);
            limit.saturating_sub(progressing).min(pending)
        }
    }
}

/// An up-to-date work whose agent has not reported its current generation Available
pub fn is_progressing(work: &DeliveryWork) -> bool {
    !work.is_deleting() && !work.reports(WORK_CONDITION_AVAILABLE)
}
