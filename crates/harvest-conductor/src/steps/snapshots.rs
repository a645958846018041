//! Snapshot listing, per-segment detail fetch, and reconciliation into
//! normalized trace records.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvest_core::raw::{RawSegmentDetail, RawSegmentRow};
use harvest_core::{ArtifactKind, JobInput, JobTarget, RecordKind, SnapshotFilter};
use harvest_fetch::{fetch_all_pages, fetch_if_missing, process_in_chunks, FetchError, PageQuery};
use harvest_snapshot::{merge_windows, reconcile_window, EntityLookup, SnapshotRecords, TraceContext};
use harvest_store::{read_json, read_records, write_records, Storage};

use crate::runner::pipeline::StepContext;
use crate::runner::targets::TargetStep;
use crate::steps::entities::normalized_entities;

/// Per hour: page through the snapshot listing, then fetch the detail of
/// every listed segment.
pub struct ExtractSnapshots;

#[async_trait::async_trait]
impl TargetStep for ExtractSnapshots {
    fn step_name(&self) -> &'static str {
        "extract_snapshots"
    }

    fn item_name(&self) -> &'static str {
        "snapshot artifacts"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = Arc::new(ctx.paths.target(target));
        let settings = input.parallelism.for_artifact(ArtifactKind::Snapshots);
        let shared_target = Arc::new(target.clone());
        let mut fetched = 0;

        for hour in &input.hourly_time_ranges {
            let list_path = tp.raw_snapshot_list(hour);
            let query = PageQuery::new(*hour);
            let listing = fetch_if_missing(ctx.storage.as_ref(), &list_path, || async {
                let rows = fetch_all_pages(ctx.api.as_ref(), target, &query).await?;
                Ok::<_, FetchError>(apply_snapshot_filter(rows, &input.snapshot_filter))
            })
            .await?;
            if let harvest_fetch::FetchOutcome::Fetched(n) = listing {
                tracing::debug!(application = %target.application_name, hour = %hour.file_label(), rows = n, "snapshot listing fetched");
                fetched += n;
            }

            let rows: Vec<RawSegmentRow> = read_records(ctx.storage.as_ref(), &list_path)?;
            let mut seen = HashSet::new();
            let segments: Vec<(String, i64)> = rows
                .into_iter()
                .map(|r| (r.request_guid, r.id))
                .filter(|key| seen.insert(key.clone()))
                .collect();

            let (api, storage) = (ctx.api.clone(), ctx.storage.clone());
            let (worker_target, worker_paths, hour) = (shared_target.clone(), tp.clone(), *hour);
            fetched += process_in_chunks(segments, settings, move |chunk: Vec<(String, i64)>| {
                let (api, storage) = (api.clone(), storage.clone());
                let (target, tp) = (worker_target.clone(), worker_paths.clone());
                async move {
                    let mut count = 0;
                    for (request_id, segment_id) in &chunk {
                        let path = tp.raw_segment_detail(&hour, request_id, *segment_id);
                        let outcome = fetch_if_missing(storage.as_ref(), &path, || {
                            api.get_segment_detail(&target, request_id, *segment_id)
                        })
                        .await?;
                        count += usize::from(outcome.was_fetched());
                    }
                    Ok::<usize, anyhow::Error>(count)
                }
            })
            .await?;
        }
        Ok(fetched)
    }
}

/// Keep only the traces whose entry row passes the filter. Rows are kept or
/// dropped a whole trace at a time.
pub fn apply_snapshot_filter(rows: Vec<Value>, filter: &SnapshotFilter) -> Vec<Value> {
    if filter.user_experience.is_empty() && filter.business_transactions.is_empty() {
        return rows;
    }
    let parsed: Vec<RawSegmentRow> = rows
        .iter()
        .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
        .collect();

    let mut entry_seen = HashSet::new();
    let mut accepted = HashSet::new();
    // entry rows first, then the first row of traces without one
    for pass_entry in [true, false] {
        for row in &parsed {
            if row.first_in_chain != pass_entry || entry_seen.contains(&row.request_guid) {
                continue;
            }
            entry_seen.insert(row.request_guid.clone());
            if filter.accepts(&row.user_experience, row.business_transaction_id) {
                accepted.insert(row.request_guid.clone());
            }
        }
    }

    rows.into_iter()
        .zip(parsed)
        .filter(|(_, row)| accepted.contains(&row.request_guid))
        .map(|(v, _)| v)
        .collect()
}

/// Reconcile every hour's listing into per-hour record files, then merge the
/// hours into the aggregated files.
pub struct IndexSnapshots;

#[async_trait::async_trait]
impl TargetStep for IndexSnapshots {
    fn step_name(&self) -> &'static str {
        "index_snapshots"
    }

    fn item_name(&self) -> &'static str {
        "snapshots"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let storage = ctx.storage.as_ref();
        let tp = ctx.paths.target(target);
        let entities = normalized_entities(storage, target, &tp)?;
        let lookup = EntityLookup::from_rows(&entities);
        let trace_ctx = TraceContext {
            controller: target.controller_host().to_string(),
            application_name: target.application_name.clone(),
            application_id: target.application_id,
        };

        let mut windows = Vec::with_capacity(input.hourly_time_ranges.len());
        for hour in &input.hourly_time_ranges {
            let rows: Vec<RawSegmentRow> = read_records(storage, &tp.raw_snapshot_list(hour))?;
            let detail_for = |request_id: &str, segment_id: i64| {
                load_detail(storage, &tp.raw_segment_detail(hour, request_id, segment_id))
            };
            let records = reconcile_window(rows, detail_for, &lookup, &trace_ctx);
            write_snapshot_records(storage, |kind| tp.hour_index(hour, kind), &records)?;
            tracing::debug!(
                application = %target.application_name,
                hour = %hour.file_label(),
                snapshots = records.snapshots.len(),
                segments = records.segments.len(),
                "hour reconciled"
            );
            windows.push(records);
        }

        let merged = merge_windows(windows);
        write_snapshot_records(storage, |kind| tp.index(kind), &merged)?;
        Ok(merged.snapshots.len())
    }
}

/// A detail that cannot be read or parsed is reported here and treated as
/// missing; the cached file stays in place and is not fetched again.
fn load_detail(storage: &dyn Storage, path: &Path) -> Option<RawSegmentDetail> {
    match read_json::<RawSegmentDetail>(storage, path) {
        Ok(detail) => detail,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable segment detail");
            None
        }
    }
}

fn write_snapshot_records(
    storage: &dyn Storage,
    path_for: impl Fn(RecordKind) -> PathBuf,
    records: &SnapshotRecords,
) -> Result<()> {
    write_records(storage, &path_for(RecordKind::Snapshots), &records.snapshots)?;
    write_records(storage, &path_for(RecordKind::Segments), &records.segments)?;
    write_records(storage, &path_for(RecordKind::ExitCalls), &records.exit_calls)?;
    write_records(storage, &path_for(RecordKind::ServiceEndpointCalls), &records.service_endpoint_calls)?;
    write_records(storage, &path_for(RecordKind::DetectedErrors), &records.detected_errors)?;
    write_records(storage, &path_for(RecordKind::BusinessData), &records.business_data)?;
    Ok(())
}
