pub mod entity;
pub mod job;
pub mod raw;
pub mod records;
pub mod time_range;

pub use entity::{EntityKind, EntityRow, MetricPath};
pub use job::{
    ArtifactKind, ChunkSettings, Credentials, Feature, FeatureFlags, JobInput, JobState, JobStatus,
    JobTarget, Parallelism, SnapshotFilter, ValidationStatus,
};
pub use records::RecordKind;
pub use time_range::{now_rfc3339, TimeRange};
