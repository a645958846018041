//! Normalized records handed to report consumers.

use serde::{Deserialize, Serialize};

/// Which normalized collection a record belongs to. Drives file naming.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Snapshots,
    Segments,
    ExitCalls,
    ServiceEndpointCalls,
    DetectedErrors,
    BusinessData,
    MetricValues,
    ActivityFlows,
    Events,
    Configuration,
}

impl RecordKind {
    pub const SNAPSHOT_KINDS: &'static [RecordKind] = &[
        RecordKind::Snapshots,
        RecordKind::Segments,
        RecordKind::ExitCalls,
        RecordKind::ServiceEndpointCalls,
        RecordKind::DetectedErrors,
        RecordKind::BusinessData,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            RecordKind::Snapshots => "snapshots",
            RecordKind::Segments => "segments",
            RecordKind::ExitCalls => "exit_calls",
            RecordKind::ServiceEndpointCalls => "service_endpoint_calls",
            RecordKind::DetectedErrors => "detected_errors",
            RecordKind::BusinessData => "business_data",
            RecordKind::MetricValues => "metric_values",
            RecordKind::ActivityFlows => "activity_flows",
            RecordKind::Events => "events",
            RecordKind::Configuration => "configuration",
        }
    }
}

/// One trace instance, described by its entry segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub controller: String,
    pub application_name: String,
    pub application_id: i64,
    pub request_id: String,
    pub tier_id: i64,
    pub tier_name: String,
    pub node_id: i64,
    pub node_name: String,
    pub bt_id: i64,
    pub bt_name: String,
    pub occurred: String,
    pub occurred_millis: i64,
    pub duration_ms: i64,
    pub user_experience: String,
    pub call_chain: String,
    pub num_segments: usize,
    pub num_exit_calls: usize,
    pub num_errors: usize,
    pub has_errors: bool,
}

/// One tier-local hop within a trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SegmentRecord {
    pub request_id: String,
    pub segment_id: i64,
    /// 0 when the segment is the entry point or its caller could not be found.
    pub parent_segment_id: i64,
    pub parent_tier_name: String,
    pub tier_id: i64,
    pub tier_name: String,
    pub node_id: i64,
    pub node_name: String,
    pub bt_id: i64,
    pub bt_name: String,
    pub is_first_in_chain: bool,
    pub correlation_token: String,
    pub occurred_millis: i64,
    pub duration_ms: i64,
    pub user_experience: String,
    pub call_chain: String,
    pub num_exit_calls: usize,
    pub num_errors: usize,
    pub error_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExitCallRecord {
    pub request_id: String,
    pub segment_id: i64,
    pub tier_name: String,
    pub exit_type: String,
    pub to_entity_type: String,
    pub to_entity_id: i64,
    pub to_entity_name: String,
    pub sequence_counter: String,
    pub detail: String,
    pub duration_ms: i64,
    pub num_calls: i64,
    pub has_errors: bool,
    pub call_chain: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceEndpointCallRecord {
    pub request_id: String,
    pub segment_id: i64,
    pub tier_name: String,
    pub sep_id: i64,
    pub sep_name: String,
    pub sep_type: String,
}

/// Reconciled error for one segment. `error_id` is 0 for detail entries no
/// catalogued identity could be paired with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectedErrorRecord {
    pub request_id: String,
    pub segment_id: i64,
    pub tier_name: String,
    pub error_id: i64,
    pub error_name: String,
    pub error_type: String,
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BusinessDataRecord {
    pub request_id: String,
    pub segment_id: i64,
    pub data_name: String,
    pub data_value: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricValueRecord {
    pub entity_kind: String,
    pub entity_id: i64,
    pub entity_name: String,
    pub metric_name: String,
    pub metric_path: String,
    pub occurred_millis: i64,
    pub value: i64,
    pub min: i64,
    pub max: i64,
    pub sum: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityFlowRecord {
    /// Flow map this edge came from, e.g. `application` or `tier.7`.
    pub scope: String,
    pub from_type: String,
    pub from_name: String,
    pub to_type: String,
    pub to_name: String,
    pub exit_type: String,
    pub calls: i64,
    pub calls_per_minute: i64,
    pub avg_response_ms: i64,
    pub errors: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub event_id: i64,
    pub event_type: String,
    pub sub_type: String,
    pub severity: String,
    pub summary: String,
    pub occurred: String,
    pub occurred_millis: i64,
    pub tier_name: String,
    pub node_name: String,
    pub bt_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigurationRecord {
    pub section: String,
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kinds_have_distinct_stems() {
        let mut stems: Vec<&str> = RecordKind::SNAPSHOT_KINDS
            .iter()
            .map(|k| k.file_stem())
            .collect();
        stems.sort();
        stems.dedup();
        assert_eq!(stems.len(), RecordKind::SNAPSHOT_KINDS.len());
    }
}
