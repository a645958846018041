use std::path::PathBuf;

use harvest_core::{EntityKind, JobTarget, RecordKind, TimeRange};

use crate::sanitize_segment;

/// Well-known paths under an output root.
#[derive(Debug, Clone)]
pub struct HarvestPaths {
    pub root: PathBuf,
    pub job_json: PathBuf,
    pub events_jsonl: PathBuf,
    pub lock_file: PathBuf,
}

impl HarvestPaths {
    /// Derive all paths from an output root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            job_json: root.join("job.json"),
            events_jsonl: root.join("events.jsonl"),
            lock_file: root.join(".lock"),
            root,
        }
    }

    /// True when a checkpoint already exists here.
    pub fn has_checkpoint(&self) -> bool {
        self.job_json.is_file()
    }

    /// `<root>/<controller-host>/<app-name>.<app-id>/`
    pub fn target(&self, target: &JobTarget) -> TargetPaths {
        let dir = self
            .root
            .join(sanitize_segment(target.controller_host()))
            .join(sanitize_segment(&format!(
                "{}.{}",
                target.application_name, target.application_id
            )));
        TargetPaths::new(dir)
    }
}

/// Artifact paths for one target application.
#[derive(Debug, Clone)]
pub struct TargetPaths {
    pub dir: PathBuf,
    pub raw_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl TargetPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            raw_dir: dir.join("raw"),
            index_dir: dir.join("index"),
            dir,
        }
    }

    pub fn raw_entities(&self, kind: EntityKind) -> PathBuf {
        self.raw_dir
            .join("entities")
            .join(format!("{}.json", kind.file_stem()))
    }

    pub fn raw_configuration(&self) -> PathBuf {
        self.raw_dir.join("configuration.json")
    }

    pub fn raw_metric(
        &self,
        kind: EntityKind,
        entity_id: i64,
        metric: &str,
        hour: &TimeRange,
    ) -> PathBuf {
        self.raw_dir
            .join("metrics")
            .join(kind.file_stem())
            .join(entity_id.to_string())
            .join(sanitize_segment(metric))
            .join(format!("{}.json", hour.file_label()))
    }

    pub fn raw_flowmap(&self, scope: &str) -> PathBuf {
        self.raw_dir
            .join("flowmaps")
            .join(format!("{}.json", sanitize_segment(scope)))
    }

    pub fn raw_snapshot_dir(&self, hour: &TimeRange) -> PathBuf {
        self.raw_dir.join("snapshots").join(hour.file_label())
    }

    pub fn raw_snapshot_list(&self, hour: &TimeRange) -> PathBuf {
        self.raw_snapshot_dir(hour).join("list.json")
    }

    pub fn raw_segment_detail(&self, hour: &TimeRange, request_id: &str, segment_id: i64) -> PathBuf {
        self.raw_snapshot_dir(hour).join(format!(
            "{}.{}.json",
            sanitize_segment(request_id),
            segment_id
        ))
    }

    pub fn raw_events(&self, hour: &TimeRange) -> PathBuf {
        self.raw_dir
            .join("events")
            .join(format!("{}.json", hour.file_label()))
    }

    /// Normalized entity list: `index/entities/<kind>.json`.
    pub fn entity_index(&self, kind: EntityKind) -> PathBuf {
        self.index_dir
            .join("entities")
            .join(format!("{}.json", kind.file_stem()))
    }

    /// Per-hour normalized records: `index/<hour>/<record-kind>.json`.
    pub fn hour_index(&self, hour: &TimeRange, kind: RecordKind) -> PathBuf {
        self.index_dir
            .join(hour.file_label())
            .join(format!("{}.json", kind.file_stem()))
    }

    /// Aggregated records across hours: `index/<record-kind>.json`.
    pub fn index(&self, kind: RecordKind) -> PathBuf {
        self.index_dir.join(format!("{}.json", kind.file_stem()))
    }
}
