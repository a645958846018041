use std::collections::{HashMap, HashSet};

use harvest_core::raw::{RawSegmentDetail, RawSegmentRow};

use crate::error::ReconcileError;
use crate::errors::MatchedError;

/// One segment with its detail payload and everything derived for it.
#[derive(Debug, Clone, Default)]
pub struct TraceSegment {
    pub row: RawSegmentRow,
    pub detail: RawSegmentDetail,
    pub parent_segment_id: i64,
    pub call_chain: String,
    pub errors: Vec<MatchedError>,
}

impl TraceSegment {
    pub fn id(&self) -> i64 {
        self.row.id
    }
}

/// All segments of one trace, in listing order.
#[derive(Debug, Clone)]
pub struct Trace {
    pub request_id: String,
    pub segments: Vec<TraceSegment>,
}

impl Trace {
    /// The entry segment, falling back to the first listed one when the
    /// listing window cut the entry off.
    pub fn entry(&self) -> Option<&TraceSegment> {
        self.segments
            .iter()
            .find(|s| s.row.first_in_chain)
            .or_else(|| self.segments.first())
    }

    pub fn segment(&self, id: i64) -> Option<&TraceSegment> {
        self.segments.iter().find(|s| s.id() == id)
    }
}

/// Group listing rows by request id, in order of first appearance. A segment
/// listed twice is kept once.
pub fn group_by_trace(rows: Vec<RawSegmentRow>) -> Vec<(String, Vec<RawSegmentRow>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<RawSegmentRow>> = HashMap::new();
    let mut seen: HashSet<(String, i64)> = HashSet::new();
    for row in rows {
        if !seen.insert((row.request_guid.clone(), row.id)) {
            continue;
        }
        if !groups.contains_key(&row.request_guid) {
            order.push(row.request_guid.clone());
        }
        groups.entry(row.request_guid.clone()).or_default().push(row);
    }
    order
        .into_iter()
        .filter_map(|id| groups.remove(&id).map(|rows| (id, rows)))
        .collect()
}

/// Attach detail payloads to one trace's rows.
pub fn collect_segments(
    request_id: &str,
    rows: Vec<RawSegmentRow>,
    detail_for: impl Fn(&str, i64) -> Option<RawSegmentDetail>,
) -> Result<Trace, ReconcileError> {
    if rows.is_empty() {
        return Err(ReconcileError::NoSegments);
    }
    let mut segments = Vec::with_capacity(rows.len());
    for row in rows {
        if row.request_guid != request_id {
            return Err(ReconcileError::MixedTrace {
                expected: request_id.to_string(),
                found: row.request_guid,
                segment_id: row.id,
            });
        }
        let detail = detail_for(request_id, row.id).ok_or_else(|| ReconcileError::MissingDetail {
            request_id: request_id.to_string(),
            segment_id: row.id,
        })?;
        segments.push(TraceSegment {
            row,
            detail,
            ..TraceSegment::default()
        });
    }
    Ok(Trace {
        request_id: request_id.to_string(),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(guid: &str, id: i64) -> RawSegmentRow {
        RawSegmentRow {
            request_guid: guid.into(),
            id,
            ..RawSegmentRow::default()
        }
    }

    #[test]
    fn groups_keep_listing_order_and_drop_duplicates() {
        let groups = group_by_trace(vec![row("b", 1), row("a", 2), row("b", 3), row("b", 1)]);
        let ids: Vec<(&str, Vec<i64>)> = groups
            .iter()
            .map(|(g, rows)| (g.as_str(), rows.iter().map(|r| r.id).collect()))
            .collect();
        assert_eq!(ids, vec![("b", vec![1, 3]), ("a", vec![2])]);
    }

    #[test]
    fn missing_detail_fails_the_trace() {
        let err = collect_segments("a", vec![row("a", 1)], |_, _| None).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::MissingDetail {
                request_id: "a".into(),
                segment_id: 1
            }
        );
    }

    #[test]
    fn entry_falls_back_to_first_segment() {
        let trace = collect_segments("a", vec![row("a", 4), row("a", 5)], |_, _| {
            Some(RawSegmentDetail::default())
        })
        .unwrap();
        assert_eq!(trace.entry().unwrap().id(), 4);
    }
}
