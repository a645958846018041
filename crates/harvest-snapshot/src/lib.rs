//! Per-trace reconciliation of snapshot listings.
//!
//! Each trace runs strictly through `collect → resolve_parents →
//! build_call_chains → match_errors → aggregate`. Unresolved parents and
//! unmatched errors are data, not failures: they show up in the records.

pub mod aggregate;
pub mod chain;
pub mod collect;
pub mod error;
pub mod errors;
pub mod lookup;
pub mod parents;

pub use aggregate::{aggregate, merge_windows, reconcile_trace, reconcile_window, SnapshotRecords, TraceContext};
pub use collect::{collect_segments, group_by_trace, Trace, TraceSegment};
pub use error::ReconcileError;
pub use errors::{match_segment_errors, MatchPass, MatchedError};
pub use lookup::EntityLookup;
pub use parents::resolve_parents;
