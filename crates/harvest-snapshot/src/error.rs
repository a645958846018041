use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("trace has no segments")]
    NoSegments,

    #[error("segment {segment_id} belongs to trace {found}, expected {expected}")]
    MixedTrace {
        expected: String,
        found: String,
        segment_id: i64,
    },

    #[error("no detail payload for segment {segment_id} of trace {request_id}")]
    MissingDetail { request_id: String, segment_id: i64 },
}
