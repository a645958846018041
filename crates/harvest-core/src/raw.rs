//! Raw controller payload shapes, as stored by the extract steps.
//!
//! Every field is defaulted: controllers of different versions omit fields
//! freely and a missing field must never fail a whole listing.

use serde::{Deserialize, Serialize};

/// One row of a snapshot listing. Rows are per segment; rows sharing a
/// `request_guid` belong to one trace and the `first_in_chain` row is the
/// trace's entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSegmentRow {
    #[serde(rename = "requestGUID")]
    pub request_guid: String,
    pub id: i64,
    pub application_component_id: i64,
    pub application_component_node_id: i64,
    pub business_transaction_id: i64,
    pub first_in_chain: bool,
    pub server_start_time: i64,
    pub time_taken_in_milli_secs: i64,
    pub user_experience: String,
    /// Pipe-delimited topology: `Component:7|Exit:HTTP|Component:9`.
    pub call_chain: String,
    #[serde(rename = "errorIDs")]
    pub error_ids: Vec<i64>,
    /// Sequence counter of the exit call that produced this segment.
    pub caller_sequence_counter: String,
}

/// Outbound call made by a segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawExitCall {
    /// Exit type: HTTP, JDBC, WEB_SERVICE, JMS ...
    pub exit_point_name: String,
    /// APPLICATION_COMPONENT, BACKEND or APPLICATION.
    pub to_entity_type: String,
    pub to_entity_id: i64,
    pub snapshot_sequence_counter: String,
    pub detail_string: String,
    pub time_taken_in_millis: i64,
    pub count: i64,
    pub error_occured: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawErrorDetail {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawDataCollector {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Per-segment detail payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSegmentDetail {
    pub exit_calls: Vec<RawExitCall>,
    pub error_details: Vec<RawErrorDetail>,
    pub service_endpoint_ids: Vec<i64>,
    pub data_collectors: Vec<RawDataCollector>,
}

/// One controller event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub subtype: String,
    pub severity: String,
    pub summary: String,
    pub event_time: i64,
    pub tier_name: String,
    pub node_name: String,
    pub business_transaction_name: String,
}

/// One metric series as returned by the metric-data endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMetricData {
    pub metric_id: i64,
    pub metric_name: String,
    pub metric_path: String,
    pub frequency: String,
    pub metric_values: Vec<RawMetricValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMetricValue {
    pub start_time_in_millis: i64,
    pub value: i64,
    pub min: i64,
    pub max: i64,
    pub sum: i64,
    pub count: i64,
}

/// Flow map graph: nodes plus call edges between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFlowmap {
    pub nodes: Vec<RawFlowmapNode>,
    pub edges: Vec<RawFlowmapEdge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFlowmapNode {
    pub id: String,
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFlowmapEdge {
    pub source_node: String,
    pub target_node: String,
    pub exit_point_type: String,
    pub stats: RawFlowmapStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFlowmapStats {
    pub calls: i64,
    pub average_response_time: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn segment_row_tolerates_missing_fields() {
        let row: RawSegmentRow =
            serde_json::from_value(json!({"requestGUID": "r1", "id": 5, "errorIDs": [100]})).unwrap();
        assert_eq!(row.request_guid, "r1");
        assert_eq!(row.error_ids, vec![100]);
        assert!(!row.first_in_chain);
        assert!(row.call_chain.is_empty());
    }

    #[test]
    fn segment_detail_reads_camel_case() {
        let d: RawSegmentDetail = serde_json::from_value(json!({
            "exitCalls": [{"exitPointName": "HTTP", "toEntityType": "APPLICATION_COMPONENT", "toEntityId": 9, "snapshotSequenceCounter": "1"}],
            "errorDetails": [{"name": "java.lang.NullPointerException", "value": "at Foo.bar"}],
            "dataCollectors": [{"name": "orderId", "value": "42", "type": "HTTP"}]
        }))
        .unwrap();
        assert_eq!(d.exit_calls[0].to_entity_id, 9);
        assert_eq!(d.exit_calls[0].snapshot_sequence_counter, "1");
        assert_eq!(d.error_details[0].name, "java.lang.NullPointerException");
        assert_eq!(d.data_collectors[0].data_type, "HTTP");
    }
}
