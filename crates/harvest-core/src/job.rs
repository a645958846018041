use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::time_range::{now_rfc3339, TimeRange};

// ── Job status ──

/// Pipeline position of a job. Every non-terminal value names a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    ValidateTargets,
    ExtractEntities,
    ExtractConfiguration,
    ExtractMetrics,
    ExtractFlowmaps,
    ExtractSnapshots,
    ExtractEvents,
    IndexEntities,
    IndexConfiguration,
    IndexMetrics,
    IndexFlowmaps,
    IndexSnapshots,
    IndexEvents,
    Done,
    Error,
}

impl JobStatus {
    /// Steps in execution order.
    pub const STEPS: &'static [JobStatus] = &[
        JobStatus::ValidateTargets,
        JobStatus::ExtractEntities,
        JobStatus::ExtractConfiguration,
        JobStatus::ExtractMetrics,
        JobStatus::ExtractFlowmaps,
        JobStatus::ExtractSnapshots,
        JobStatus::ExtractEvents,
        JobStatus::IndexEntities,
        JobStatus::IndexConfiguration,
        JobStatus::IndexMetrics,
        JobStatus::IndexFlowmaps,
        JobStatus::IndexSnapshots,
        JobStatus::IndexEvents,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Feature flag that gates this step, if any.
    pub fn feature(self) -> Option<Feature> {
        match self {
            JobStatus::ExtractConfiguration | JobStatus::IndexConfiguration => {
                Some(Feature::Configuration)
            }
            JobStatus::ExtractMetrics | JobStatus::IndexMetrics => Some(Feature::Metrics),
            JobStatus::ExtractFlowmaps | JobStatus::IndexFlowmaps => Some(Feature::Flowmaps),
            JobStatus::ExtractSnapshots | JobStatus::IndexSnapshots => Some(Feature::Snapshots),
            JobStatus::ExtractEvents | JobStatus::IndexEvents => Some(Feature::Events),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::ValidateTargets => "validate_targets",
            JobStatus::ExtractEntities => "extract_entities",
            JobStatus::ExtractConfiguration => "extract_configuration",
            JobStatus::ExtractMetrics => "extract_metrics",
            JobStatus::ExtractFlowmaps => "extract_flowmaps",
            JobStatus::ExtractSnapshots => "extract_snapshots",
            JobStatus::ExtractEvents => "extract_events",
            JobStatus::IndexEntities => "index_entities",
            JobStatus::IndexConfiguration => "index_configuration",
            JobStatus::IndexMetrics => "index_metrics",
            JobStatus::IndexFlowmaps => "index_flowmaps",
            JobStatus::IndexSnapshots => "index_snapshots",
            JobStatus::IndexEvents => "index_events",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Feature flags ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Metrics,
    Snapshots,
    Flowmaps,
    Events,
    Configuration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub metrics: bool,
    #[serde(default = "default_true")]
    pub snapshots: bool,
    #[serde(default = "default_true")]
    pub flowmaps: bool,
    #[serde(default)]
    pub events: bool,
    #[serde(default)]
    pub configuration: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            metrics: true,
            snapshots: true,
            flowmaps: true,
            events: false,
            configuration: false,
        }
    }
}

impl FeatureFlags {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Metrics => self.metrics,
            Feature::Snapshots => self.snapshots,
            Feature::Flowmaps => self.flowmaps,
            Feature::Events => self.events,
            Feature::Configuration => self.configuration,
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Parallelism ──

/// Chunking for one artifact type: how many entities per worker and how many
/// workers in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub max_concurrency: usize,
}

impl ChunkSettings {
    pub const fn new(chunk_size: usize, max_concurrency: usize) -> Self {
        Self {
            chunk_size,
            max_concurrency,
        }
    }

    pub const fn sequential(chunk_size: usize) -> Self {
        Self::new(chunk_size, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Tiers,
    Nodes,
    Backends,
    BusinessTransactions,
    ServiceEndpoints,
    Errors,
    Flowmaps,
    Snapshots,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parallelism {
    #[serde(default = "default_entity_chunks")]
    pub tiers: ChunkSettings,
    #[serde(default = "default_node_chunks")]
    pub nodes: ChunkSettings,
    #[serde(default = "default_entity_chunks")]
    pub backends: ChunkSettings,
    #[serde(default = "default_entity_chunks")]
    pub business_transactions: ChunkSettings,
    #[serde(default = "default_entity_chunks")]
    pub service_endpoints: ChunkSettings,
    #[serde(default = "default_entity_chunks")]
    pub errors: ChunkSettings,
    #[serde(default = "default_flowmap_chunks")]
    pub flowmaps: ChunkSettings,
    #[serde(default = "default_snapshot_chunks")]
    pub snapshots: ChunkSettings,
}

fn default_entity_chunks() -> ChunkSettings {
    ChunkSettings::new(10, 3)
}

fn default_node_chunks() -> ChunkSettings {
    ChunkSettings::new(20, 3)
}

fn default_flowmap_chunks() -> ChunkSettings {
    ChunkSettings::new(5, 2)
}

fn default_snapshot_chunks() -> ChunkSettings {
    ChunkSettings::new(50, 5)
}

impl Default for Parallelism {
    fn default() -> Self {
        Self {
            tiers: default_entity_chunks(),
            nodes: default_node_chunks(),
            backends: default_entity_chunks(),
            business_transactions: default_entity_chunks(),
            service_endpoints: default_entity_chunks(),
            errors: default_entity_chunks(),
            flowmaps: default_flowmap_chunks(),
            snapshots: default_snapshot_chunks(),
        }
    }
}

impl Parallelism {
    pub fn for_artifact(&self, kind: ArtifactKind) -> ChunkSettings {
        match kind {
            ArtifactKind::Tiers => self.tiers,
            ArtifactKind::Nodes => self.nodes,
            ArtifactKind::Backends => self.backends,
            ArtifactKind::BusinessTransactions => self.business_transactions,
            ArtifactKind::ServiceEndpoints => self.service_endpoints,
            ArtifactKind::Errors => self.errors,
            ArtifactKind::Flowmaps => self.flowmaps,
            ArtifactKind::Snapshots => self.snapshots,
        }
    }

    /// Force every artifact type to run one chunk at a time.
    pub fn sequential(mut self) -> Self {
        for s in [
            &mut self.tiers,
            &mut self.nodes,
            &mut self.backends,
            &mut self.business_transactions,
            &mut self.service_endpoints,
            &mut self.errors,
            &mut self.flowmaps,
            &mut self.snapshots,
        ] {
            s.max_concurrency = 1;
        }
        self
    }
}

// ── Snapshot filter ──

/// Optional narrowing of which snapshots are fetched in detail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFilter {
    /// Keep only these user experience values (NORMAL, SLOW, VERY_SLOW, STALL, ERROR).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_experience: Vec<String>,
    /// Keep only snapshots of these business transaction IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_transactions: Vec<i64>,
}

impl SnapshotFilter {
    pub fn accepts(&self, user_experience: &str, bt_id: i64) -> bool {
        let ux_ok = self.user_experience.is_empty()
            || self
                .user_experience
                .iter()
                .any(|u| u.eq_ignore_ascii_case(user_experience));
        let bt_ok = self.business_transactions.is_empty() || self.business_transactions.contains(&bt_id);
        ux_ok && bt_ok
    }
}

// ── Input ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInput {
    pub time_range: TimeRange,
    pub expanded_time_range: TimeRange,
    pub hourly_time_ranges: Vec<TimeRange>,
    #[serde(default)]
    pub flags: FeatureFlags,
    #[serde(default)]
    pub snapshot_filter: SnapshotFilter,
    #[serde(default)]
    pub parallelism: Parallelism,
}

impl JobInput {
    /// Derive the expanded range and hourly windows from a requested range.
    pub fn new(time_range: TimeRange, flags: FeatureFlags) -> Result<Self> {
        Ok(Self {
            expanded_time_range: time_range.expand_to_hours()?,
            hourly_time_ranges: time_range.split_hourly()?,
            time_range,
            flags,
            snapshot_filter: SnapshotFilter::default(),
            parallelism: Parallelism::default(),
        })
    }
}

// ── Targets ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Unknown,
    Valid,
    Invalid,
    NoController,
}

/// Opaque controller credentials. Stored as supplied, never decrypted here.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Credentials {
    pub user_name: String,
    #[serde(default)]
    pub user_password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("user_password", &"[MASKED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobTarget {
    pub controller_url: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub application_id: i64,
    pub application_name: String,
    #[serde(default)]
    pub validation_status: ValidationStatus,
}

impl JobTarget {
    pub fn is_valid(&self) -> bool {
        self.validation_status == ValidationStatus::Valid
    }

    /// Host (and port) of the controller URL, without scheme or path.
    pub fn controller_host(&self) -> &str {
        let url = self.controller_url.trim();
        let without_scheme = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url);
        without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(without_scheme)
    }

    /// `controller/application` label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.controller_host(), self.application_name)
    }
}

// ── Job state ──

/// The checkpoint document. Mutated after every step and persisted so a later
/// invocation resumes exactly where this one stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_name: String,
    pub status: JobStatus,
    pub targets: Vec<JobTarget>,
    pub input: JobInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Status of the step that failed, when `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<JobStatus>,
    #[serde(default)]
    pub version: u32,
}

impl JobState {
    pub fn new(job_name: impl Into<String>, targets: Vec<JobTarget>, input: JobInput) -> Self {
        Self {
            job_name: job_name.into(),
            status: JobStatus::STEPS[0],
            targets,
            input,
            started_at: None,
            updated_at: None,
            completed_at: None,
            failed_step: None,
            version: 0,
        }
    }

    pub fn valid_targets(&self) -> impl Iterator<Item = &JobTarget> {
        self.targets.iter().filter(|t| t.is_valid())
    }

    /// Record a status change and bump the version.
    pub fn set_status(&mut self, status: JobStatus) {
        if status == JobStatus::Error && !self.status.is_terminal() {
            self.failed_step = Some(self.status);
        }
        self.status = status;
        self.version += 1;
        let now = now_rfc3339();
        if status == JobStatus::Done {
            self.completed_at = Some(now.clone());
        }
        self.updated_at = Some(now);
    }

    /// Put a failed job back on the step that failed. Returns false when the
    /// job is not in `Error` or the failed step is unknown.
    pub fn retry_failed_step(&mut self) -> bool {
        match (self.status, self.failed_step) {
            (JobStatus::Error, Some(step)) => {
                self.failed_step = None;
                self.set_status(step);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> JobInput {
        let range = TimeRange::parse("2024-01-31T13:20:00Z", "2024-01-31T15:05:00Z").unwrap();
        JobInput::new(range, FeatureFlags::default()).unwrap()
    }

    fn target(url: &str) -> JobTarget {
        JobTarget {
            controller_url: url.into(),
            credentials: Credentials::default(),
            application_id: 0,
            application_name: "shop".into(),
            validation_status: ValidationStatus::Unknown,
        }
    }

    #[test]
    fn every_gated_step_has_a_feature() {
        assert_eq!(JobStatus::ValidateTargets.feature(), None);
        assert_eq!(JobStatus::IndexEntities.feature(), None);
        assert_eq!(JobStatus::ExtractMetrics.feature(), Some(Feature::Metrics));
        assert_eq!(JobStatus::IndexSnapshots.feature(), Some(Feature::Snapshots));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::ExtractSnapshots).unwrap();
        assert_eq!(json, "\"extract_snapshots\"");
        assert_eq!(JobStatus::ExtractSnapshots.to_string(), "extract_snapshots");
    }

    #[test]
    fn input_derives_hourly_windows() {
        let input = input();
        assert_eq!(input.hourly_time_ranges.len(), 3);
        assert_eq!(input.expanded_time_range.file_label(), "202401311300-202401311600");
    }

    #[test]
    fn controller_host_strips_scheme_and_path() {
        assert_eq!(target("https://acme.saas.example.com:443/controller").controller_host(), "acme.saas.example.com:443");
        assert_eq!(target("ctl.local").controller_host(), "ctl.local");
    }

    #[test]
    fn credentials_are_masked_in_debug() {
        let c = Credentials {
            user_name: "admin@customer1".into(),
            user_password: "hunter2".into(),
        };
        let s = format!("{c:?}");
        assert!(!s.contains("hunter2"));
    }

    #[test]
    fn error_status_records_failed_step() {
        let mut state = JobState::new("test", vec![target("ctl")], input());
        state.set_status(JobStatus::ExtractEntities);
        state.set_status(JobStatus::Error);
        assert_eq!(state.failed_step, Some(JobStatus::ExtractEntities));
        assert_eq!(state.version, 2);

        assert!(state.retry_failed_step());
        assert_eq!(state.status, JobStatus::ExtractEntities);
        assert_eq!(state.failed_step, None);
        assert!(!state.retry_failed_step());
    }

    #[test]
    fn snapshot_filter_accepts() {
        let f = SnapshotFilter {
            user_experience: vec!["ERROR".into()],
            business_transactions: vec![],
        };
        assert!(f.accepts("error", 5));
        assert!(!f.accepts("NORMAL", 5));
        assert!(SnapshotFilter::default().accepts("NORMAL", 1));
    }

    #[test]
    fn parallelism_defaults_from_partial_yaml() {
        let p: Parallelism = serde_yaml::from_str("snapshots: { chunk_size: 7, max_concurrency: 1 }").unwrap();
        assert_eq!(p.snapshots, ChunkSettings::sequential(7));
        assert_eq!(p.tiers, ChunkSettings::new(10, 3));
        assert_eq!(p.sequential().nodes.max_concurrency, 1);
    }
}
