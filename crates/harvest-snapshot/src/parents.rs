use crate::collect::Trace;

/// Link every segment to the segment whose exit call produced it.
///
/// Entry segments are roots. For the rest, the first segment in listing order
/// owning an exit call whose sequence counter equals the segment's
/// correlation token is the parent. No match leaves the parent at 0.
pub fn resolve_parents(trace: &mut Trace) {
    let parents: Vec<i64> = trace
        .segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            let token = seg.row.caller_sequence_counter.as_str();
            if seg.row.first_in_chain || token.is_empty() {
                return 0;
            }
            trace
                .segments
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .find(|(_, other)| {
                    other
                        .detail
                        .exit_calls
                        .iter()
                        .any(|call| call.snapshot_sequence_counter == token)
                })
                .map(|(_, other)| other.id())
                .unwrap_or(0)
        })
        .collect();

    for (seg, parent) in trace.segments.iter_mut().zip(parents) {
        seg.parent_segment_id = parent;
    }
}
