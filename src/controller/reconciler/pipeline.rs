//! # Pipeline
//!
//! Ordered list of stages run against one replica set per pass. Every stage
//! sees the resource as left by the previous one; errors are collected in
//! order and only a `Stop` signal halts the chain.

use async_trait::async_trait;
use tracing::{debug, debug_span, Instrument};

use crate::controller::reconciler::distribute::DistributionStage;
use crate::controller::reconciler::finalize::FinalizeStage;
use crate::controller::reconciler::guard::GuardInstallStage;
use crate::controller::reconciler::status::StatusStage;
use crate::controller::reconciler::types::{Context, PassState, Signal, StageKind, StageOutcome};
use crate::crd::WorkReplicaSet;
use crate::observability;

/// One step of a reconciliation pass
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn reconcile(
        &self,
        ctx: &Context,
        resource: WorkReplicaSet,
        pass: &mut PassState,
    ) -> StageOutcome;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.kind()))
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(vec![
            Box::new(FinalizeStage),
            Box::new(GuardInstallStage),
            Box::new(DistributionStage),
            Box::new(StatusStage),
        ])
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Drive `resource` through every stage, returning the final resource
    pub async fn run(
        &self,
        ctx: &Context,
        resource: WorkReplicaSet,
        pass: &mut PassState,
    ) -> WorkReplicaSet {
        let mut current = resource;
        for stage in &self.stages {
            let kind = stage.kind();
            let span = debug_span!("stage", stage = %kind);
            let outcome = stage.reconcile(ctx, current, pass).instrument(span).await;
            current = outcome.resource;
            for error in outcome.errors {
                observability::metrics::increment_stage_errors(kind.as_str());
                pass.errors.push(error);
            }
            if outcome.signal == Signal::Stop {
                debug!(stage = %kind, "pipeline stopped");
                pass.stopped_by = Some(kind);
                break;
            }
        }
        current
    }
}
