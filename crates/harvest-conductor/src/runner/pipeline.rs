use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use harvest_core::{now_rfc3339, JobState, JobStatus};
use harvest_fetch::ControllerApi;
use harvest_store::{HarvestPaths, Storage};

use crate::runner::event_log::{Event, EventLogger};
use crate::runner::progress::ProgressSink;
use crate::state::{Checkpoint, Pipeline};

/// Everything a step needs besides the job state.
#[derive(Clone)]
pub struct StepContext {
    pub api: Arc<dyn ControllerApi>,
    pub storage: Arc<dyn Storage>,
    pub paths: HarvestPaths,
    pub progress: ProgressSink,
}

/// One pipeline step. `Ok(true)` advances the job; `Ok(false)` or an error
/// moves it to `Error`.
#[async_trait::async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, state: &mut JobState, ctx: &StepContext) -> Result<bool>;
}

/// Drive `state` through the pipeline until it reaches a terminal status.
///
/// The checkpoint is written before the first step and after every
/// transition, so a crash at any point resumes at the step that was running.
/// A failed checkpoint write aborts the run.
pub async fn run_job(
    state: &mut JobState,
    pipeline: &Pipeline,
    ctx: &StepContext,
    checkpoint: &Checkpoint,
) -> Result<JobStatus> {
    let mut events = EventLogger::new(&ctx.paths.events_jsonl);

    if state.started_at.is_none() {
        state.started_at = Some(now_rfc3339());
    }
    checkpoint
        .save(state)
        .context("writing initial checkpoint")?;
    events.record(Event::JobStart {
        job_name: state.job_name.clone(),
        status: state.status,
        targets: state.targets.len(),
    });

    while !state.status.is_terminal() {
        let step = state.status;

        let disabled = step
            .feature()
            .is_some_and(|f| !state.input.flags.is_enabled(f));
        if disabled {
            tracing::info!(step = %step, "feature disabled, skipping step");
            events.record(Event::StepSkipped {
                step,
                reason: "feature disabled".into(),
            });
            state.set_status(pipeline.next(step));
            checkpoint.save(state)?;
            continue;
        }

        let Some(handler) = pipeline.handler(step) else {
            anyhow::bail!("no handler registered for step {step}");
        };

        tracing::info!(job = %state.job_name, step = %step, "step started");
        events.record(Event::StepStart { step });
        let started = Instant::now();
        let outcome = handler.run(state, ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(true) => {
                tracing::info!(step = %step, duration_ms, "step passed");
                events.record(Event::StepPassed { step, duration_ms });
                state.set_status(pipeline.next(step));
            }
            Ok(false) => {
                tracing::error!(step = %step, "step reported failure");
                events.record(Event::StepFailed {
                    step,
                    duration_ms,
                    error: "step reported failure".into(),
                });
                state.set_status(JobStatus::Error);
            }
            Err(e) => {
                tracing::error!(step = %step, error = %format!("{e:#}"), "step failed");
                events.record(Event::StepFailed {
                    step,
                    duration_ms,
                    error: format!("{e:#}"),
                });
                state.set_status(JobStatus::Error);
            }
        }
        checkpoint
            .save(state)
            .with_context(|| format!("checkpoint after {step}"))?;
    }

    events.record(Event::JobFinished {
        status: state.status,
        version: state.version,
    });
    Ok(state.status)
}
