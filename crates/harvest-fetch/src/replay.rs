//! Offline controller that answers from recorded responses.
//!
//! Layout under the replay root, one directory per application name:
//!
//! ```text
//! <root>/<application>/application.json      {"id": 42, "name": "shop", "cursorField": "scrollId"}
//! <root>/<application>/entities/<kind>.json  raw entity arrays
//! <root>/<application>/configuration.json
//! <root>/<application>/metrics.json          array of metric series
//! <root>/<application>/flowmaps/<scope>.json
//! <root>/<application>/snapshots.json        segment rows for the whole range
//! <root>/<application>/segments/<request-id>.<segment-id>.json
//! <root>/<application>/events.json
//! ```
//!
//! Missing files answer with empty payloads. Every call is counted so tests
//! can assert that a re-run issues none.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};

use harvest_core::{EntityKind, JobTarget, TimeRange};
use harvest_store::sanitize_segment;

use crate::api::{ControllerApi, CursorField, Page, PageQuery, TargetValidation};
use crate::error::{FetchError, Result};

pub struct ReplayController {
    root: PathBuf,
    calls: AtomicUsize,
}

impl ReplayController {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of controller calls answered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn app_dir(&self, target: &JobTarget) -> PathBuf {
        self.root.join(sanitize_segment(&target.application_name))
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn read(&self, path: &Path) -> Result<Option<Value>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FetchError::Io(e)),
        }
    }

    async fn read_array(&self, path: &Path) -> Result<Vec<Value>> {
        Ok(match self.read(path).await? {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        })
    }
}

fn millis_field(v: &Value, key: &str) -> i64 {
    v.get(key).and_then(|x| x.as_i64()).unwrap_or(0)
}

#[async_trait::async_trait]
impl ControllerApi for ReplayController {
    async fn validate_target(&self, target: &JobTarget) -> Result<TargetValidation> {
        self.hit();
        let root_is_dir = tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !root_is_dir {
            return Ok(TargetValidation::NoController);
        }
        let Some(app) = self.read(&self.app_dir(target).join("application.json")).await? else {
            return Ok(TargetValidation::Invalid);
        };
        Ok(TargetValidation::Valid {
            application_id: millis_field(&app, "id"),
            application_name: app
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or(&target.application_name)
                .to_string(),
        })
    }

    async fn list_entities(&self, target: &JobTarget, kind: EntityKind) -> Result<Vec<Value>> {
        self.hit();
        let path = self
            .app_dir(target)
            .join("entities")
            .join(format!("{}.json", kind.file_stem()));
        self.read_array(&path).await
    }

    async fn get_page(
        &self,
        target: &JobTarget,
        query: &PageQuery,
        _cursor_field: CursorField,
        cursor_id: i64,
    ) -> Result<Option<Page>> {
        self.hit();
        let dir = self.app_dir(target);
        let field = match self.read(&dir.join("application.json")).await? {
            Some(app) if app.get("cursorField").and_then(|f| f.as_str()) == Some("scrollId") => {
                CursorField::ScrollId
            }
            _ => CursorField::RsdScrollId,
        };
        let rows: Vec<Value> = self
            .read_array(&dir.join("snapshots.json"))
            .await?
            .into_iter()
            .filter(|row| query.range.contains_millis(millis_field(row, "serverStartTime")))
            .collect();

        let start = cursor_id.max(0) as usize;
        if start >= rows.len() {
            return Ok(None);
        }
        let end = (start + query.page_size.max(1)).min(rows.len());
        let next = if end < rows.len() { end as i64 } else { 0 };
        let mut body = serde_json::Map::new();
        body.insert(
            "requestSegmentDataListItems".to_string(),
            Value::Array(rows[start..end].to_vec()),
        );
        body.insert(field.name().to_string(), json!(next));
        Ok(Some(Page::from_response(&Value::Object(body))))
    }

    async fn get_metric_data(
        &self,
        target: &JobTarget,
        metric_path: &str,
        range: &TimeRange,
    ) -> Result<Value> {
        self.hit();
        let series: Vec<Value> = self
            .read_array(&self.app_dir(target).join("metrics.json"))
            .await?
            .into_iter()
            .filter(|s| s.get("metricPath").and_then(|p| p.as_str()) == Some(metric_path))
            .map(|mut s| {
                if let Some(Value::Array(values)) = s.get_mut("metricValues") {
                    values.retain(|v| range.contains_millis(millis_field(v, "startTimeInMillis")));
                }
                s
            })
            .collect();
        Ok(Value::Array(series))
    }

    async fn get_flowmap(&self, target: &JobTarget, scope: &str, _range: &TimeRange) -> Result<Value> {
        self.hit();
        let path = self
            .app_dir(target)
            .join("flowmaps")
            .join(format!("{}.json", sanitize_segment(scope)));
        Ok(self
            .read(&path)
            .await?
            .unwrap_or_else(|| json!({"nodes": [], "edges": []})))
    }

    async fn get_segment_detail(
        &self,
        target: &JobTarget,
        request_id: &str,
        segment_id: i64,
    ) -> Result<Value> {
        self.hit();
        let path = self.app_dir(target).join("segments").join(format!(
            "{}.{}.json",
            sanitize_segment(request_id),
            segment_id
        ));
        Ok(self.read(&path).await?.unwrap_or_else(|| json!({})))
    }

    async fn get_events(&self, target: &JobTarget, range: &TimeRange) -> Result<Vec<Value>> {
        self.hit();
        Ok(self
            .read_array(&self.app_dir(target).join("events.json"))
            .await?
            .into_iter()
            .filter(|e| range.contains_millis(millis_field(e, "eventTime")))
            .collect())
    }

    async fn get_configuration(&self, target: &JobTarget) -> Result<Value> {
        self.hit();
        Ok(self
            .read(&self.app_dir(target).join("configuration.json"))
            .await?
            .unwrap_or_else(|| json!({})))
    }
}
