use anyhow::Result;

use harvest_core::{JobInput, JobState, JobTarget};

use crate::runner::pipeline::{StepContext, StepHandler};

/// Work a step does for one validated target. Returns the number of items
/// produced or fetched, for progress reporting.
#[async_trait::async_trait]
pub trait TargetStep: Send + Sync {
    fn step_name(&self) -> &'static str;

    /// What the returned count measures, e.g. `segment details`.
    fn item_name(&self) -> &'static str;

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext)
        -> Result<usize>;
}

/// Runs a [`TargetStep`] over every valid target, one target at a time.
///
/// A failing target is logged and left behind; the others still run and the
/// step still advances.
pub struct ForEachTarget<S>(pub S);

#[async_trait::async_trait]
impl<S: TargetStep> StepHandler for ForEachTarget<S> {
    async fn run(&self, state: &mut JobState, ctx: &StepContext) -> Result<bool> {
        let step = self.0.step_name();
        let targets: Vec<JobTarget> = state.valid_targets().cloned().collect();
        if targets.is_empty() {
            tracing::warn!(step, "no valid targets");
        }

        let mut failed = 0usize;
        for target in &targets {
            match self.0.run_target(target, &state.input, ctx).await {
                Ok(count) => {
                    ctx.progress
                        .report(step, &target.label(), self.0.item_name(), count);
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        controller = %target.controller_host(),
                        application = %target.application_name,
                        step,
                        error = %format!("{e:#}"),
                        "target failed, continuing with the rest"
                    );
                }
            }
        }
        if failed > 0 {
            tracing::warn!(step, failed, total = targets.len(), "step finished with failed targets");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::parse_job;
    use crate::runner::progress::ProgressSink;
    use harvest_core::ValidationStatus;
    use harvest_fetch::ReplayController;
    use harvest_store::{FsStorage, HarvestPaths};
    use std::sync::{Arc, Mutex};

    const JOB: &str = "name: t\ntime_range: { from: \"2024-01-31T13:00:00Z\", to: \"2024-01-31T14:00:00Z\" }\ntargets:\n  - { controller_url: http://a, application_name: broken }\n  - { controller_url: http://b, application_name: shop }\n  - { controller_url: http://c, application_name: skipped }\n";

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl TargetStep for Recorder {
        fn step_name(&self) -> &'static str {
            "extract_metrics"
        }

        fn item_name(&self) -> &'static str {
            "metric windows"
        }

        async fn run_target(&self, target: &JobTarget, _: &JobInput, _: &StepContext) -> Result<usize> {
            self.0.lock().unwrap().push(target.application_name.clone());
            if target.application_name == "broken" {
                anyhow::bail!("boom");
            }
            Ok(3)
        }
    }

    #[tokio::test]
    async fn failing_target_does_not_stop_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let mut state = parse_job(JOB).unwrap();
        state.targets[0].validation_status = ValidationStatus::Valid;
        state.targets[1].validation_status = ValidationStatus::Valid;
        state.targets[2].validation_status = ValidationStatus::Invalid;

        let (progress, reporter) = ProgressSink::spawn_reporter();
        let ctx = StepContext {
            api: Arc::new(ReplayController::new(tmp.path())),
            storage: Arc::new(FsStorage),
            paths: HarvestPaths::discover(tmp.path()),
            progress,
        };
        let step = ForEachTarget(Recorder(Mutex::new(Vec::new())));
        assert!(step.run(&mut state, &ctx).await.unwrap());
        assert_eq!(*step.0 .0.lock().unwrap(), vec!["broken", "shop"]);

        drop(ctx);
        let totals = reporter.await.unwrap();
        assert_eq!(totals.get("extract_metrics", "metric windows"), 3);
    }
}
