pub mod event_log;
pub mod pipeline;
pub mod progress;
pub mod targets;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use harvest_core::JobState;
use harvest_fetch::ControllerApi;
use harvest_store::{lock_file, HarvestPaths, Storage};

use crate::runner::pipeline::{run_job, StepContext};
use crate::runner::progress::{ProgressSink, ProgressTotals};
use crate::state::Checkpoint;
use crate::steps::default_pipeline;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output: PathBuf,
    /// Put a job left in `Error` back on the step that failed.
    pub retry: bool,
}

#[derive(Debug)]
pub struct RunReport {
    pub state: JobState,
    pub totals: ProgressTotals,
}

/// Run a job against an output directory.
///
/// An existing checkpoint in the directory wins over `fresh`; the run picks
/// up at the persisted status. The directory stays locked for the whole run.
pub async fn run(
    fresh: JobState,
    api: Arc<dyn ControllerApi>,
    storage: Arc<dyn Storage>,
    opts: &RunOptions,
) -> Result<RunReport> {
    let paths = HarvestPaths::discover(&opts.output);
    let _lock = lock_file(&paths.lock_file)
        .with_context(|| format!("locking output directory {}", paths.root.display()))?;
    let checkpoint = Checkpoint::new(&paths.job_json);

    let mut state = match checkpoint.load()? {
        Some(saved) => {
            if saved.job_name != fresh.job_name {
                tracing::warn!(
                    saved = %saved.job_name,
                    requested = %fresh.job_name,
                    "output directory holds a different job, resuming it"
                );
            }
            tracing::info!(job = %saved.job_name, status = %saved.status, version = saved.version, "resuming checkpoint");
            saved
        }
        None => fresh,
    };
    if opts.retry {
        let failed = state.failed_step;
        if state.retry_failed_step() {
            tracing::info!(step = ?failed, "retrying failed step");
        } else {
            tracing::warn!(status = %state.status, "nothing to retry");
        }
    }

    let pipeline = default_pipeline()?;
    let (progress, reporter) = ProgressSink::spawn_reporter();
    let ctx = StepContext {
        api,
        storage,
        paths,
        progress,
    };
    let status = run_job(&mut state, &pipeline, &ctx, &checkpoint).await?;
    drop(ctx);
    let totals = reporter.await.context("progress reporter stopped")?;

    tracing::info!(job = %state.job_name, status = %status, version = state.version, "job finished");
    Ok(RunReport { state, totals })
}
