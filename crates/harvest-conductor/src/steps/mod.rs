pub mod configuration;
pub mod entities;
pub mod events;
pub mod flowmaps;
pub mod metrics;
pub mod snapshots;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use std::sync::Arc;

use harvest_core::JobStatus;

use crate::runner::pipeline::StepHandler;
use crate::runner::targets::{ForEachTarget, TargetStep};
use crate::state::Pipeline;

/// The standard harvest pipeline: every step bound to its handler.
pub fn default_pipeline() -> Result<Pipeline> {
    fn per_target<S: TargetStep + 'static>(step: S) -> Arc<dyn StepHandler> {
        Arc::new(ForEachTarget(step))
    }

    Pipeline::new(vec![
        (JobStatus::ValidateTargets, Arc::new(validate::ValidateTargets) as Arc<dyn StepHandler>),
        (JobStatus::ExtractEntities, per_target(entities::ExtractEntities)),
        (JobStatus::ExtractConfiguration, per_target(configuration::ExtractConfiguration)),
        (JobStatus::ExtractMetrics, per_target(metrics::ExtractMetrics)),
        (JobStatus::ExtractFlowmaps, per_target(flowmaps::ExtractFlowmaps)),
        (JobStatus::ExtractSnapshots, per_target(snapshots::ExtractSnapshots)),
        (JobStatus::ExtractEvents, per_target(events::ExtractEvents)),
        (JobStatus::IndexEntities, per_target(entities::IndexEntities)),
        (JobStatus::IndexConfiguration, per_target(configuration::IndexConfiguration)),
        (JobStatus::IndexMetrics, per_target(metrics::IndexMetrics)),
        (JobStatus::IndexFlowmaps, per_target(flowmaps::IndexFlowmaps)),
        (JobStatus::IndexSnapshots, per_target(snapshots::IndexSnapshots)),
        (JobStatus::IndexEvents, per_target(events::IndexEvents)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_covers_every_step() {
        let p = default_pipeline().unwrap();
        for step in JobStatus::STEPS {
            assert!(p.handler(*step).is_some(), "missing {step}");
        }
    }
}
