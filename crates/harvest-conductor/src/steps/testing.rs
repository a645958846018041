//! Fixtures shared by the step tests.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use harvest_core::{
    Credentials, FeatureFlags, JobInput, JobTarget, TimeRange, ValidationStatus,
};
use harvest_fetch::ReplayController;
use harvest_store::{FsStorage, HarvestPaths};

use crate::runner::pipeline::StepContext;
use crate::runner::progress::ProgressSink;

/// Replay recordings under `<root>/replay`, output under `<root>/out`.
pub fn context(root: &Path) -> StepContext {
    let (progress, _reporter) = ProgressSink::spawn_reporter();
    StepContext {
        api: Arc::new(ReplayController::new(root.join("replay"))),
        storage: Arc::new(FsStorage),
        paths: HarvestPaths::discover(root.join("out")),
        progress,
    }
}

pub fn valid_target(name: &str, id: i64) -> JobTarget {
    JobTarget {
        controller_url: "http://ctl.local/controller".into(),
        credentials: Credentials::default(),
        application_id: id,
        application_name: name.into(),
        validation_status: ValidationStatus::Valid,
    }
}

/// Two hours, 13:00 to 15:00 on 2024-01-31.
pub fn input() -> JobInput {
    let range = TimeRange::parse("2024-01-31T13:00:00Z", "2024-01-31T15:00:00Z").unwrap();
    let flags = FeatureFlags {
        events: true,
        configuration: true,
        ..FeatureFlags::default()
    };
    JobInput::new(range, flags).unwrap()
}

pub fn write_json(path: &Path, value: Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}
