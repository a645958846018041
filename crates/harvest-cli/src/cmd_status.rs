use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use harvest_conductor::Checkpoint;
use harvest_core::JobState;
use harvest_store::HarvestPaths;

/// Execute `harvest status <dir>`
pub fn execute(output: &Path) -> Result<()> {
    let paths = HarvestPaths::discover(output);
    if !paths.has_checkpoint() {
        println!("No checkpoint in {}", output.display());
        return Ok(());
    }
    if let Some(state) = Checkpoint::new(&paths.job_json).load()? {
        print!("{}", render_status(&state));
    }
    Ok(())
}

fn render_status(state: &JobState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job \"{}\"", state.job_name);
    let _ = writeln!(out, "  status:    {}", state.status);
    if let Some(step) = state.failed_step {
        let _ = writeln!(out, "  failed at: {step}");
    }
    let _ = writeln!(out, "  version:   {}", state.version);
    for (label, ts) in [
        ("started:  ", &state.started_at),
        ("updated:  ", &state.updated_at),
        ("completed:", &state.completed_at),
    ] {
        if let Some(ts) = ts {
            let _ = writeln!(out, "  {label} {ts}");
        }
    }
    let _ = writeln!(out, "  targets:");
    for t in &state.targets {
        let _ = writeln!(
            out,
            "    {:<40} id={:<8} {:?}",
            t.label(),
            t.application_id,
            t.validation_status
        );
    }
    out
}
