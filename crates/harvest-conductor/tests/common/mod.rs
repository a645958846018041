//! Replay recordings and job files shared by the pipeline tests.

#![allow(dead_code)]

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvest_conductor::{parse_job, run, RunOptions, RunReport};
use harvest_core::{JobTarget, RecordKind, TimeRange};
use harvest_fetch::{ControllerApi, ReplayController};
use harvest_store::{read_records, FsStorage, HarvestPaths};

pub const FROM: &str = "2024-01-31T13:00:00Z";
pub const TO: &str = "2024-01-31T16:00:00Z";

pub fn job_yaml(apps: &[&str], extra: &str) -> String {
    let mut yaml = format!("name: nightly\ntime_range: {{ from: \"{FROM}\", to: \"{TO}\" }}\n{extra}targets:\n");
    for app in apps {
        yaml.push_str(&format!(
            "  - controller_url: http://ctl.local/controller\n    user_name: harvest@acme\n    user_password: secret\n    application_name: {app}\n"
        ));
    }
    yaml
}

pub fn hours() -> Vec<TimeRange> {
    TimeRange::parse(FROM, TO).unwrap().split_hourly().unwrap()
}

pub fn write(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

pub fn entry_segment(hour: usize) -> i64 {
    1000 + hour as i64 * 10 + 2
}

pub fn child_segment(hour: usize) -> i64 {
    1000 + hour as i64 * 10 + 3
}

/// Records one application with three recorded hours. Each hour holds two
/// traces: `h<i>-a` with a single segment, and `h<i>-b` whose second segment
/// was called through the first one's only exit call.
pub fn record_application(replay: &Path, name: &str, id: i64) {
    let app = replay.join(name);
    write(&app.join("application.json"), &json!({"id": id, "name": name}));
    write(
        &app.join("entities/tiers.json"),
        &json!([{"id": 7, "name": "Web", "agentType": "JAVA"}, {"id": 9, "name": "Pay", "agentType": "JAVA"}]),
    );
    write(
        &app.join("entities/business_transactions.json"),
        &json!([{"id": 50, "name": "/checkout", "tierId": 7, "entryPointType": "SERVLET"}]),
    );
    write(
        &app.join("entities/errors.json"),
        &json!([{"id": 100, "name": "NullPointerException", "applicationComponentId": 9}]),
    );

    let mut rows = Vec::new();
    let mut events = Vec::new();
    for (i, hour) in hours().iter().enumerate() {
        let base = hour.from_millis() + 5 * 60_000;
        rows.push(json!({
            "requestGUID": format!("h{i}-a"), "id": 1000 + i as i64 * 10 + 1,
            "applicationComponentId": 7, "applicationComponentNodeId": 0, "businessTransactionId": 50,
            "firstInChain": true, "serverStartTime": base, "timeTakenInMilliSecs": 120,
            "userExperience": "NORMAL", "callChain": "Component:7"
        }));
        rows.push(json!({
            "requestGUID": format!("h{i}-b"), "id": entry_segment(i),
            "applicationComponentId": 7, "businessTransactionId": 50,
            "firstInChain": true, "serverStartTime": base + 1_000, "timeTakenInMilliSecs": 900,
            "userExperience": "ERROR", "callChain": "Component:7|Exit:HTTP|Component:9"
        }));
        rows.push(json!({
            "requestGUID": format!("h{i}-b"), "id": child_segment(i),
            "applicationComponentId": 9, "businessTransactionId": 50,
            "serverStartTime": base + 1_020, "timeTakenInMilliSecs": 700,
            "userExperience": "ERROR", "callChain": "Component:9",
            "errorIDs": [100], "callerSequenceCounter": "1"
        }));
        write(
            &app.join(format!("segments/h{i}-b.{}.json", entry_segment(i))),
            &json!({"exitCalls": [{
                "exitPointName": "HTTP", "toEntityType": "APPLICATION_COMPONENT", "toEntityId": 9,
                "snapshotSequenceCounter": "1", "timeTakenInMillis": 700, "count": 1, "errorOccured": true
            }]}),
        );
        write(
            &app.join(format!("segments/h{i}-b.{}.json", child_segment(i))),
            &json!({
                "errorDetails": [{"name": "java.lang.NullPointerException", "value": "NPE in Pay.charge\n\tat Pay.charge(Pay.java:42)"}],
                "dataCollectors": [{"name": "orderId", "value": format!("o-{i}"), "type": "HTTP"}]
            }),
        );
        events.push(json!({"id": 500 + i as i64, "type": "POLICY_OPEN_CRITICAL", "severity": "ERROR", "eventTime": base}));
    }
    write(&app.join("snapshots.json"), &Value::Array(rows));
    write(&app.join("events.json"), &Value::Array(events));
    write(
        &app.join("flowmaps/application.json"),
        &json!({
            "nodes": [{"id": "t7", "name": "Web"}, {"id": "t9", "name": "Pay"}],
            "edges": [{"sourceNode": "t7", "targetNode": "t9", "exitPointType": "HTTP", "stats": {"calls": 360}}]
        }),
    );
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub api: Arc<ReplayController>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ReplayController::new(dir.path().join("replay")));
        Self { dir, api }
    }

    pub fn replay(&self) -> PathBuf {
        self.dir.path().join("replay")
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub async fn run(&self, yaml: &str, output: &str, retry: bool) -> RunReport {
        self.try_run(yaml, output, retry).await.unwrap()
    }

    pub async fn try_run(&self, yaml: &str, output: &str, retry: bool) -> anyhow::Result<RunReport> {
        let api: Arc<dyn ControllerApi> = self.api.clone();
        let opts = RunOptions {
            output: self.output(output),
            retry,
        };
        run(parse_job(yaml)?, api, Arc::new(FsStorage), &opts).await
    }
}

/// Aggregated records of one kind for `target`.
pub fn aggregated<T: DeserializeOwned>(output: &Path, target: &JobTarget, kind: RecordKind) -> Vec<T> {
    let tp = HarvestPaths::discover(output).target(target);
    read_records(&FsStorage, &tp.index(kind)).unwrap()
}

/// Raw bytes of the aggregated file, for byte-for-byte comparisons.
pub fn aggregated_bytes(output: &Path, target: &JobTarget, kind: RecordKind) -> Vec<u8> {
    let tp = HarvestPaths::discover(output).target(target);
    std::fs::read(tp.index(kind)).unwrap()
}
