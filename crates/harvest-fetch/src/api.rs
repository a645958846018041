use serde_json::Value;

use harvest_core::{EntityKind, JobTarget, TimeRange};

use crate::error::Result;

/// Records per snapshot listing request.
pub const PAGE_SIZE: usize = 600;

/// Outcome of probing a target's controller and application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetValidation {
    Valid {
        application_id: i64,
        application_name: String,
    },
    /// Controller reachable but the application does not exist or access is denied.
    Invalid,
    /// Controller unreachable or rejected the credentials.
    NoController,
}

/// Name of the response field that carries the listing cursor. Which one a
/// controller populates depends on its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorField {
    RsdScrollId,
    ScrollId,
}

impl CursorField {
    pub fn name(self) -> &'static str {
        match self {
            CursorField::RsdScrollId => "rsdScrollId",
            CursorField::ScrollId => "scrollId",
        }
    }

    pub fn alternate(self) -> Self {
        match self {
            CursorField::RsdScrollId => CursorField::ScrollId,
            CursorField::ScrollId => CursorField::RsdScrollId,
        }
    }
}

/// Snapshot listing query for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub range: TimeRange,
    pub page_size: usize,
}

impl PageQuery {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            page_size: PAGE_SIZE,
        }
    }
}

/// One page of a listing. Either cursor may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub rsd_scroll_id: Option<i64>,
    pub scroll_id: Option<i64>,
}

impl Page {
    pub fn cursor(&self, field: CursorField) -> Option<i64> {
        match field {
            CursorField::RsdScrollId => self.rsd_scroll_id,
            CursorField::ScrollId => self.scroll_id,
        }
    }

    /// Build a page from a raw listing response:
    /// `{"requestSegmentDataListItems": [...], "rsdScrollId": 42}`.
    pub fn from_response(body: &Value) -> Self {
        let records = body
            .get("requestSegmentDataListItems")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let cursor = |field: CursorField| body.get(field.name()).and_then(|v| v.as_i64());
        Self {
            records,
            rsd_scroll_id: cursor(CursorField::RsdScrollId),
            scroll_id: cursor(CursorField::ScrollId),
        }
    }
}

/// Remote controller capability. Transport, authentication and URL
/// construction live behind this trait; raw payloads come back as JSON.
#[async_trait::async_trait]
pub trait ControllerApi: Send + Sync {
    async fn validate_target(&self, target: &JobTarget) -> Result<TargetValidation>;

    /// Full entity list of one kind for the target application.
    async fn list_entities(&self, target: &JobTarget, kind: EntityKind) -> Result<Vec<Value>>;

    /// One page of the snapshot listing. `None` when the controller has no
    /// more data for the query.
    async fn get_page(
        &self,
        target: &JobTarget,
        query: &PageQuery,
        cursor_field: CursorField,
        cursor_id: i64,
    ) -> Result<Option<Page>>;

    async fn get_metric_data(
        &self,
        target: &JobTarget,
        metric_path: &str,
        range: &TimeRange,
    ) -> Result<Value>;

    /// Flow map for a scope such as `application` or `tier.7`.
    async fn get_flowmap(&self, target: &JobTarget, scope: &str, range: &TimeRange) -> Result<Value>;

    async fn get_segment_detail(
        &self,
        target: &JobTarget,
        request_id: &str,
        segment_id: i64,
    ) -> Result<Value>;

    async fn get_events(&self, target: &JobTarget, range: &TimeRange) -> Result<Vec<Value>>;

    async fn get_configuration(&self, target: &JobTarget) -> Result<Value>;
}
