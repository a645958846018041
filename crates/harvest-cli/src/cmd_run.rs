use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use harvest_conductor::{load_job, run, RunOptions};
use harvest_core::JobStatus;
use harvest_fetch::{ControllerApi, ReplayController};
use harvest_store::FsStorage;

/// Execute `harvest run <job.yaml> --output <dir> --replay <dir>`
pub fn execute(job_file: &Path, output: &Path, replay: &Path, retry: bool) -> Result<()> {
    let fresh = load_job(job_file)?;
    if !replay.is_dir() {
        tracing::warn!(replay = %replay.display(), "replay directory missing, every target will report no controller");
    }
    let api: Arc<dyn ControllerApi> = Arc::new(ReplayController::new(replay));
    let opts = RunOptions {
        output: output.to_path_buf(),
        retry,
    };

    let rt = tokio::runtime::Runtime::new().context("starting runtime")?;
    let report = rt.block_on(run(fresh, api, Arc::new(FsStorage), &opts))?;

    let state = &report.state;
    println!("Job \"{}\": {} (version {})", state.job_name, state.status, state.version);
    for ((step, item), count) in &report.totals.by_step {
        println!("  {step:<24} {count:>8} {item}");
    }

    if state.status == JobStatus::Error {
        let step = state
            .failed_step
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".into());
        bail!("job stopped at step {step}; fix the cause and rerun with --retry");
    }
    Ok(())
}
