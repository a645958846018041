use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use harvest_conductor::load_job;
use harvest_core::{JobState, JobStatus};

/// Execute `harvest plan <job.yaml>`
pub fn execute(job_file: &Path) -> Result<()> {
    let state = load_job(job_file)?;
    print!("{}", render_plan(&state));
    Ok(())
}

fn render_plan(state: &JobState) -> String {
    let input = &state.input;
    let mut out = String::new();
    let _ = writeln!(out, "[dry-run] Job: {}", state.job_name);
    let _ = writeln!(
        out,
        "  Range:    {} .. {} (expanded {})",
        input.time_range.from,
        input.time_range.to,
        input.expanded_time_range.file_label()
    );
    let _ = writeln!(out, "  Hours:    {}", input.hourly_time_ranges.len());
    for hour in &input.hourly_time_ranges {
        let _ = writeln!(out, "    {}", hour.file_label());
    }

    let _ = writeln!(out, "\n  Steps:");
    for (i, step) in JobStatus::STEPS.iter().enumerate() {
        let enabled = step.feature().map_or(true, |f| input.flags.is_enabled(f));
        let mark = if enabled { "" } else { " (skipped: feature disabled)" };
        let _ = writeln!(out, "  {:>2}. {step}{mark}", i + 1);
    }

    if !input.snapshot_filter.user_experience.is_empty()
        || !input.snapshot_filter.business_transactions.is_empty()
    {
        let _ = writeln!(
            out,
            "\n  Snapshot filter: user experience {:?}, business transactions {:?}",
            input.snapshot_filter.user_experience, input.snapshot_filter.business_transactions
        );
    }

    let _ = writeln!(out, "\n  Targets:");
    for t in &state.targets {
        let _ = writeln!(out, "    {} (user {})", t.label(), t.credentials.user_name);
    }
    out
}
