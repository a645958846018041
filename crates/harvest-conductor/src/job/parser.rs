use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use harvest_core::{
    Credentials, FeatureFlags, JobInput, JobState, JobTarget, Parallelism, SnapshotFilter,
    TimeRange, ValidationStatus,
};

/// Job file as written by the user.
///
/// ```yaml
/// name: nightly
/// time_range: { from: "2024-01-31T13:00:00Z", to: "2024-01-31T16:00:00Z" }
/// flags: { events: true }
/// targets:
///   - controller_url: https://acme.saas.example.com/controller
///     user_name: harvest@acme
///     user_password: "..."
///     application_name: shop
/// ```
#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub name: String,
    pub time_range: TimeRangeSpec,
    #[serde(default)]
    pub flags: FeatureFlags,
    #[serde(default)]
    pub snapshot_filter: SnapshotFilter,
    #[serde(default)]
    pub parallelism: Parallelism,
    /// Run every artifact type one chunk at a time.
    #[serde(default)]
    pub sequential: bool,
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Deserialize)]
pub struct TimeRangeSpec {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct TargetSpec {
    pub controller_url: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_password: String,
    pub application_name: String,
    #[serde(default)]
    pub application_id: i64,
}

/// Load and validate a job from a YAML file.
pub fn load_job(path: &Path) -> Result<JobState> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_job(&content).with_context(|| format!("loading job {}", path.display()))
}

/// Parse a job file into a fresh checkpoint state.
pub fn parse_job(yaml: &str) -> Result<JobState> {
    let file: JobFile = serde_yaml::from_str(yaml).context("job file schema validation failed")?;
    validate_job(&file)?;

    let range = TimeRange::parse(&file.time_range.from, &file.time_range.to)
        .context("invalid time_range")?;
    let mut input = JobInput::new(range, file.flags)?;
    input.snapshot_filter = file.snapshot_filter;
    input.parallelism = if file.sequential {
        file.parallelism.sequential()
    } else {
        file.parallelism
    };

    let targets = file
        .targets
        .into_iter()
        .map(|t| JobTarget {
            controller_url: t.controller_url,
            credentials: Credentials {
                user_name: t.user_name,
                user_password: t.user_password,
            },
            application_id: t.application_id,
            application_name: t.application_name,
            validation_status: ValidationStatus::Unknown,
        })
        .collect();

    Ok(JobState::new(file.name, targets, input))
}

fn validate_job(file: &JobFile) -> Result<()> {
    if file.name.trim().is_empty() {
        bail!("job name must not be empty");
    }
    if file.targets.is_empty() {
        bail!("job has no targets");
    }
    for (i, t) in file.targets.iter().enumerate() {
        if t.controller_url.trim().is_empty() {
            bail!("target {i}: controller_url must not be empty");
        }
        if t.application_name.trim().is_empty() {
            bail!("target {i}: application_name must not be empty");
        }
    }
    let p = &file.parallelism;
    for (label, s) in [
        ("tiers", p.tiers),
        ("nodes", p.nodes),
        ("backends", p.backends),
        ("business_transactions", p.business_transactions),
        ("service_endpoints", p.service_endpoints),
        ("errors", p.errors),
        ("flowmaps", p.flowmaps),
        ("snapshots", p.snapshots),
    ] {
        if s.chunk_size == 0 || s.max_concurrency == 0 {
            bail!("parallelism.{label}: chunk_size and max_concurrency must be at least 1");
        }
    }
    Ok(())
}
