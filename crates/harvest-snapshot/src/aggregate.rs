use std::collections::HashSet;

use harvest_core::raw::{RawSegmentDetail, RawSegmentRow};
use harvest_core::records::{
    BusinessDataRecord, DetectedErrorRecord, ExitCallRecord, SegmentRecord,
    ServiceEndpointCallRecord, SnapshotRecord,
};
use harvest_core::time_range::millis_to_rfc3339;

use crate::chain::{build_call_chains, render_exit};
use crate::collect::{collect_segments, group_by_trace, Trace};
use crate::error::ReconcileError;
use crate::errors::match_errors;
use crate::lookup::EntityLookup;
use crate::parents::resolve_parents;

/// Where the traces came from; copied onto snapshot records.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    pub controller: String,
    pub application_name: String,
    pub application_id: i64,
}

/// Normalized records for one trace, a window, or a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotRecords {
    pub snapshots: Vec<SnapshotRecord>,
    pub segments: Vec<SegmentRecord>,
    pub exit_calls: Vec<ExitCallRecord>,
    pub service_endpoint_calls: Vec<ServiceEndpointCallRecord>,
    pub detected_errors: Vec<DetectedErrorRecord>,
    pub business_data: Vec<BusinessDataRecord>,
}

impl SnapshotRecords {
    pub fn extend(&mut self, other: SnapshotRecords) {
        self.snapshots.extend(other.snapshots);
        self.segments.extend(other.segments);
        self.exit_calls.extend(other.exit_calls);
        self.service_endpoint_calls.extend(other.service_endpoint_calls);
        self.detected_errors.extend(other.detected_errors);
        self.business_data.extend(other.business_data);
    }
}

fn name_or(name: Option<&str>, marker: &str) -> String {
    name.unwrap_or(marker).to_string()
}

/// Turn a fully reconciled trace into records.
pub fn aggregate(trace: &Trace, lookup: &EntityLookup, ctx: &TraceContext) -> SnapshotRecords {
    let mut out = SnapshotRecords::default();

    for seg in &trace.segments {
        let row = &seg.row;
        let tier_name = name_or(lookup.tier_name(row.application_component_id), "(Tier)");
        let parent_tier_name = trace
            .segment(seg.parent_segment_id)
            .filter(|_| seg.parent_segment_id != 0)
            .and_then(|p| lookup.tier_name(p.row.application_component_id))
            .unwrap_or("")
            .to_string();

        for call in &seg.detail.exit_calls {
            out.exit_calls.push(ExitCallRecord {
                request_id: trace.request_id.clone(),
                segment_id: seg.id(),
                tier_name: tier_name.clone(),
                exit_type: call.exit_point_name.clone(),
                to_entity_type: call.to_entity_type.clone(),
                to_entity_id: call.to_entity_id,
                to_entity_name: lookup
                    .destination_name(&call.to_entity_type, call.to_entity_id)
                    .unwrap_or("")
                    .to_string(),
                sequence_counter: call.snapshot_sequence_counter.clone(),
                detail: call.detail_string.clone(),
                duration_ms: call.time_taken_in_millis,
                num_calls: call.count.max(1),
                has_errors: call.error_occured,
                call_chain: render_exit(
                    &tier_name,
                    &call.exit_point_name,
                    &call.to_entity_type,
                    call.to_entity_id,
                    lookup,
                ),
            });
        }

        for sep_id in &seg.detail.service_endpoint_ids {
            let (sep_name, sep_type) = lookup
                .service_endpoints
                .get(sep_id)
                .cloned()
                .unwrap_or_else(|| ("(Service Endpoint)".to_string(), String::new()));
            out.service_endpoint_calls.push(ServiceEndpointCallRecord {
                request_id: trace.request_id.clone(),
                segment_id: seg.id(),
                tier_name: tier_name.clone(),
                sep_id: *sep_id,
                sep_name,
                sep_type,
            });
        }

        for err in &seg.errors {
            out.detected_errors.push(DetectedErrorRecord {
                request_id: trace.request_id.clone(),
                segment_id: seg.id(),
                tier_name: tier_name.clone(),
                error_id: err.error_id,
                error_name: err.error_name.clone(),
                error_type: err.error_type.clone(),
                message: err.message.clone(),
                detail: err.detail.clone(),
            });
        }

        for dc in &seg.detail.data_collectors {
            out.business_data.push(BusinessDataRecord {
                request_id: trace.request_id.clone(),
                segment_id: seg.id(),
                data_name: dc.name.clone(),
                data_value: dc.value.clone(),
                data_type: dc.data_type.clone(),
            });
        }

        out.segments.push(SegmentRecord {
            request_id: trace.request_id.clone(),
            segment_id: seg.id(),
            parent_segment_id: seg.parent_segment_id,
            parent_tier_name,
            tier_id: row.application_component_id,
            tier_name,
            node_id: row.application_component_node_id,
            node_name: name_or(lookup.node_name(row.application_component_node_id), "(Node)"),
            bt_id: row.business_transaction_id,
            bt_name: name_or(lookup.bt_name(row.business_transaction_id), "(Business Transaction)"),
            is_first_in_chain: row.first_in_chain,
            correlation_token: row.caller_sequence_counter.clone(),
            occurred_millis: row.server_start_time,
            duration_ms: row.time_taken_in_milli_secs,
            user_experience: row.user_experience.clone(),
            call_chain: seg.call_chain.clone(),
            num_exit_calls: seg.detail.exit_calls.len(),
            num_errors: seg.errors.len(),
            error_ids: row.error_ids.clone(),
        });
    }

    if let Some(entry) = trace.entry() {
        let row = &entry.row;
        let num_errors: usize = trace.segments.iter().map(|s| s.errors.len()).sum();
        out.snapshots.push(SnapshotRecord {
            controller: ctx.controller.clone(),
            application_name: ctx.application_name.clone(),
            application_id: ctx.application_id,
            request_id: trace.request_id.clone(),
            tier_id: row.application_component_id,
            tier_name: name_or(lookup.tier_name(row.application_component_id), "(Tier)"),
            node_id: row.application_component_node_id,
            node_name: name_or(lookup.node_name(row.application_component_node_id), "(Node)"),
            bt_id: row.business_transaction_id,
            bt_name: name_or(lookup.bt_name(row.business_transaction_id), "(Business Transaction)"),
            occurred: millis_to_rfc3339(row.server_start_time),
            occurred_millis: row.server_start_time,
            duration_ms: row.time_taken_in_milli_secs,
            user_experience: row.user_experience.clone(),
            call_chain: entry.call_chain.clone(),
            num_segments: trace.segments.len(),
            num_exit_calls: out.exit_calls.len(),
            num_errors,
            has_errors: num_errors > 0,
        });
    }

    out
}

/// Run one trace through collect, parents, chains, errors and aggregate.
pub fn reconcile_trace(
    request_id: &str,
    rows: Vec<RawSegmentRow>,
    detail_for: impl Fn(&str, i64) -> Option<RawSegmentDetail>,
    lookup: &EntityLookup,
    ctx: &TraceContext,
) -> Result<SnapshotRecords, ReconcileError> {
    let mut trace = collect_segments(request_id, rows, detail_for)?;
    resolve_parents(&mut trace);
    build_call_chains(&mut trace, lookup);
    match_errors(&mut trace, lookup);
    Ok(aggregate(&trace, lookup, ctx))
}

/// Reconcile every trace of one listing. A trace that fails is logged and
/// left out; the others are unaffected.
pub fn reconcile_window(
    rows: Vec<RawSegmentRow>,
    detail_for: impl Fn(&str, i64) -> Option<RawSegmentDetail>,
    lookup: &EntityLookup,
    ctx: &TraceContext,
) -> SnapshotRecords {
    let mut out = SnapshotRecords::default();
    for (request_id, trace_rows) in group_by_trace(rows) {
        match reconcile_trace(&request_id, trace_rows, &detail_for, lookup, ctx) {
            Ok(records) => out.extend(records),
            Err(e) => tracing::warn!(
                controller = %ctx.controller,
                application = %ctx.application_name,
                request_id = %request_id,
                error = %e,
                "skipping trace"
            ),
        }
    }
    out
}

/// Merge per-window records into one run-level collection. A segment seen in
/// an earlier window wins, together with its child records; a trace keeps its
/// first snapshot record. Output is sorted by time, then request and segment.
pub fn merge_windows(windows: impl IntoIterator<Item = SnapshotRecords>) -> SnapshotRecords {
    let mut out = SnapshotRecords::default();
    let mut seen_traces: HashSet<String> = HashSet::new();
    let mut seen_segments: HashSet<(String, i64)> = HashSet::new();

    for window in windows {
        let fresh: HashSet<(String, i64)> = window
            .segments
            .iter()
            .map(|s| (s.request_id.clone(), s.segment_id))
            .filter(|key| !seen_segments.contains(key))
            .collect();
        let is_fresh = |req: &str, seg: i64| fresh.contains(&(req.to_string(), seg));

        out.snapshots.extend(
            window
                .snapshots
                .into_iter()
                .filter(|s| seen_traces.insert(s.request_id.clone())),
        );
        out.segments.extend(
            window
                .segments
                .into_iter()
                .filter(|s| is_fresh(&s.request_id, s.segment_id)),
        );
        out.exit_calls.extend(
            window
                .exit_calls
                .into_iter()
                .filter(|r| is_fresh(&r.request_id, r.segment_id)),
        );
        out.service_endpoint_calls.extend(
            window
                .service_endpoint_calls
                .into_iter()
                .filter(|r| is_fresh(&r.request_id, r.segment_id)),
        );
        out.detected_errors.extend(
            window
                .detected_errors
                .into_iter()
                .filter(|r| is_fresh(&r.request_id, r.segment_id)),
        );
        out.business_data.extend(
            window
                .business_data
                .into_iter()
                .filter(|r| is_fresh(&r.request_id, r.segment_id)),
        );
        seen_segments.extend(fresh);
    }

    out.snapshots
        .sort_by(|a, b| (a.occurred_millis, &a.request_id).cmp(&(b.occurred_millis, &b.request_id)));
    out.segments.sort_by(|a, b| {
        (a.occurred_millis, &a.request_id, a.segment_id).cmp(&(b.occurred_millis, &b.request_id, b.segment_id))
    });
    // Stable sorts keep the per-segment order of child records.
    out.exit_calls
        .sort_by(|a, b| (&a.request_id, a.segment_id).cmp(&(&b.request_id, b.segment_id)));
    out.service_endpoint_calls
        .sort_by(|a, b| (&a.request_id, a.segment_id).cmp(&(&b.request_id, b.segment_id)));
    out.detected_errors
        .sort_by(|a, b| (&a.request_id, a.segment_id).cmp(&(&b.request_id, b.segment_id)));
    out.business_data
        .sort_by(|a, b| (&a.request_id, a.segment_id).cmp(&(&b.request_id, b.segment_id)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::raw::{RawErrorDetail, RawExitCall};
    use std::collections::HashMap;

    fn lookup() -> EntityLookup {
        let mut l = EntityLookup::default();
        l.tiers.insert(7, "Web".into());
        l.tiers.insert(9, "Orders".into());
        l.backends.insert(3, "ORCL".into());
        l.errors
            .insert(100, ("NullPointerException".into(), "Exception".into()));
        l
    }

    fn ctx() -> TraceContext {
        TraceContext {
            controller: "ctl".into(),
            application_name: "shop".into(),
            application_id: 1,
        }
    }

    fn row(guid: &str, id: i64, tier: i64, first: bool, token: &str, start: i64) -> RawSegmentRow {
        RawSegmentRow {
            request_guid: guid.into(),
            id,
            application_component_id: tier,
            first_in_chain: first,
            caller_sequence_counter: token.into(),
            server_start_time: start,
            call_chain: "Component:7|Exit:HTTP|Component:9".into(),
            ..RawSegmentRow::default()
        }
    }

    fn http_call(counter: &str) -> RawExitCall {
        RawExitCall {
            exit_point_name: "HTTP".into(),
            to_entity_type: "APPLICATION_COMPONENT".into(),
            to_entity_id: 9,
            snapshot_sequence_counter: counter.into(),
            ..RawExitCall::default()
        }
    }

    fn details() -> HashMap<(String, i64), RawSegmentDetail> {
        let mut d = HashMap::new();
        d.insert(
            ("b".to_string(), 1),
            RawSegmentDetail {
                exit_calls: vec![http_call("1")],
                ..RawSegmentDetail::default()
            },
        );
        d.insert(
            ("b".to_string(), 2),
            RawSegmentDetail {
                error_details: vec![RawErrorDetail {
                    name: "java.lang.NullPointerException".into(),
                    value: "NPE\n\tat x".into(),
                }],
                ..RawSegmentDetail::default()
            },
        );
        d.insert(("a".to_string(), 5), RawSegmentDetail::default());
        d
    }

    fn listing() -> Vec<RawSegmentRow> {
        let mut child = row("b", 2, 9, false, "1", 1_000);
        child.error_ids = vec![100];
        vec![row("a", 5, 7, true, "", 500), row("b", 1, 7, true, "", 1_000), child]
    }

    #[test]
    fn window_yields_records_per_trace() {
        let d = details();
        let out = reconcile_window(listing(), |r, s| d.get(&(r.to_string(), s)).cloned(), &lookup(), &ctx());
        assert_eq!(out.snapshots.len(), 2);
        assert_eq!(out.segments.len(), 3);
        let child = out.segments.iter().find(|s| s.segment_id == 2).unwrap();
        assert_eq!(child.parent_segment_id, 1);
        assert_eq!(child.parent_tier_name, "Web");
        assert_eq!(child.call_chain, "Orders");
        assert_eq!(out.exit_calls.len(), 1);
        assert_eq!(out.exit_calls[0].to_entity_name, "Orders");
        assert_eq!(out.exit_calls[0].call_chain, "Web->[HTTP]->Orders");
        assert_eq!(out.detected_errors.len(), 1);
        assert_eq!(out.detected_errors[0].error_id, 100);

        let b = out.snapshots.iter().find(|s| s.request_id == "b").unwrap();
        assert_eq!(b.num_segments, 2);
        assert_eq!(b.call_chain, "Web->[HTTP]->Orders");
        assert!(b.has_errors);
    }

    #[test]
    fn failing_trace_does_not_affect_others() {
        let mut d = details();
        d.remove(&("b".to_string(), 2));
        let out = reconcile_window(listing(), |r, s| d.get(&(r.to_string(), s)).cloned(), &lookup(), &ctx());
        assert_eq!(out.snapshots.len(), 1);
        assert_eq!(out.snapshots[0].request_id, "a");
    }

    #[test]
    fn merge_dedups_repeated_segments_and_sorts() {
        let d = details();
        let window = reconcile_window(listing(), |r, s| d.get(&(r.to_string(), s)).cloned(), &lookup(), &ctx());
        let merged = merge_windows(vec![window.clone(), window]);
        assert_eq!(merged.snapshots.len(), 2);
        assert_eq!(merged.segments.len(), 3);
        assert_eq!(merged.exit_calls.len(), 1);
        assert_eq!(merged.detected_errors.len(), 1);
        assert_eq!(merged.snapshots[0].request_id, "a");
        let order: Vec<i64> = merged.segments.iter().map(|s| s.segment_id).collect();
        assert_eq!(order, vec![5, 1, 2]);
    }
}
