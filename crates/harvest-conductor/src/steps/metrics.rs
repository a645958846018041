use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use harvest_core::raw::RawMetricData;
use harvest_core::records::MetricValueRecord;
use harvest_core::{EntityKind, EntityRow, JobInput, JobTarget, RecordKind, TimeRange};
use harvest_fetch::{fetch_if_missing, process_in_chunks};
use harvest_store::{read_records, write_records, Storage, TargetPaths};

use crate::runner::pipeline::StepContext;
use crate::runner::targets::TargetStep;
use crate::steps::entities::normalized_entities;

/// Fetch one metric window per (entity, metric, hour), fanned out per entity
/// kind with that kind's chunk settings.
pub struct ExtractMetrics;

#[async_trait::async_trait]
impl TargetStep for ExtractMetrics {
    fn step_name(&self) -> &'static str {
        "extract_metrics"
    }

    fn item_name(&self) -> &'static str {
        "metric windows"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let entities = normalized_entities(ctx.storage.as_ref(), target, &tp)?;
        let hours = Arc::new(input.hourly_time_ranges.clone());
        let target = Arc::new(target.clone());
        let tp = Arc::new(tp);

        let mut fetched = 0;
        for &kind in EntityKind::ALL {
            let of_kind: Vec<EntityRow> = entities.iter().filter(|e| e.kind() == kind).cloned().collect();
            if of_kind.is_empty() {
                continue;
            }
            let settings = input.parallelism.for_artifact(kind.artifact());
            let (api, storage) = (ctx.api.clone(), ctx.storage.clone());
            let (job, tp, hours) = (target.clone(), tp.clone(), hours.clone());

            let n = process_in_chunks(of_kind, settings, move |chunk: Vec<EntityRow>| {
                let (api, storage) = (api.clone(), storage.clone());
                let (target, tp, hours) = (job.clone(), tp.clone(), hours.clone());
                async move {
                    let mut count = 0;
                    for entity in &chunk {
                        for metric in entity.metric_paths() {
                            for hour in hours.iter() {
                                let path = tp.raw_metric(kind, entity.id(), metric.short_name, hour);
                                let outcome = fetch_if_missing(storage.as_ref(), &path, || {
                                    api.get_metric_data(&target, &metric.path, hour)
                                })
                                .await?;
                                count += usize::from(outcome.was_fetched());
                            }
                        }
                    }
                    Ok::<usize, anyhow::Error>(count)
                }
            })
            .await?;
            tracing::debug!(application = %target.application_name, kind = %kind, windows = n, "metrics fetched");
            fetched += n;
        }
        Ok(fetched)
    }
}

/// Normalize stored metric windows into per-hour and aggregated value records.
pub struct IndexMetrics;

#[async_trait::async_trait]
impl TargetStep for IndexMetrics {
    fn step_name(&self) -> &'static str {
        "index_metrics"
    }

    fn item_name(&self) -> &'static str {
        "metric values"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let storage = ctx.storage.as_ref();
        let tp = ctx.paths.target(target);
        let entities = normalized_entities(storage, target, &tp)?;

        let mut all = Vec::new();
        for hour in &input.hourly_time_ranges {
            let records = hour_values(storage, &tp, &entities, hour)?;
            write_records(storage, &tp.hour_index(hour, RecordKind::MetricValues), &records)?;
            all.extend(records);
        }

        let mut seen = HashSet::new();
        all.retain(|r: &MetricValueRecord| {
            seen.insert((r.entity_kind.clone(), r.entity_id, r.metric_name.clone(), r.occurred_millis))
        });
        all.sort_by(|a, b| {
            (&a.entity_kind, a.entity_id, &a.metric_name, a.occurred_millis).cmp(&(
                &b.entity_kind,
                b.entity_id,
                &b.metric_name,
                b.occurred_millis,
            ))
        });
        write_records(storage, &tp.index(RecordKind::MetricValues), &all)?;
        Ok(all.len())
    }
}

fn hour_values(
    storage: &dyn Storage,
    tp: &TargetPaths,
    entities: &[EntityRow],
    hour: &TimeRange,
) -> Result<Vec<MetricValueRecord>> {
    let mut out = Vec::new();
    for entity in entities {
        for metric in entity.metric_paths() {
            let path = tp.raw_metric(entity.kind(), entity.id(), metric.short_name, hour);
            let series: Vec<RawMetricData> = read_records(storage, &path)?;
            for s in series {
                for v in s.metric_values.iter().filter(|v| hour.contains_millis(v.start_time_in_millis)) {
                    out.push(MetricValueRecord {
                        entity_kind: entity.kind().file_stem().to_string(),
                        entity_id: entity.id(),
                        entity_name: entity.name().to_string(),
                        metric_name: metric.short_name.to_string(),
                        metric_path: metric.path.clone(),
                        occurred_millis: v.start_time_in_millis,
                        value: v.value,
                        min: v.min,
                        max: v.max,
                        sum: v.sum,
                        count: v.count,
                    });
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::entities::ExtractEntities;
    use crate::steps::testing::{context, input, valid_target, write_json};
    use serde_json::json;

    #[tokio::test]
    async fn windows_are_fetched_once_and_indexed() {
        let tmp = tempfile::tempdir().unwrap();
        let app = tmp.path().join("replay/shop");
        let input = input();
        let h0 = input.hourly_time_ranges[0].from_millis();
        let h1 = input.hourly_time_ranges[1].from_millis();
        write_json(&app.join("entities/tiers.json"), json!([{"id": 7, "name": "Web"}]));
        write_json(
            &app.join("metrics.json"),
            json!([{
                "metricPath": "Overall Application Performance|Web|Calls per Minute",
                "metricValues": [
                    {"startTimeInMillis": h0, "value": 10, "count": 1},
                    {"startTimeInMillis": h1, "value": 20, "count": 1}
                ]
            }]),
        );
        let ctx = context(tmp.path());
        let target = valid_target("shop", 42);
        let tp = ctx.paths.target(&target);
        ExtractEntities.run_target(&target, &input, &ctx).await.unwrap();

        // application (3 metrics) + tier (3 metrics), two hours each
        let fetched = ExtractMetrics.run_target(&target, &input, &ctx).await.unwrap();
        assert_eq!(fetched, 12);
        assert_eq!(ExtractMetrics.run_target(&target, &input, &ctx).await.unwrap(), 0);

        let indexed = IndexMetrics.run_target(&target, &input, &ctx).await.unwrap();
        assert_eq!(indexed, 2);
        let first_hour: Vec<MetricValueRecord> = read_records(
            ctx.storage.as_ref(),
            &tp.hour_index(&input.hourly_time_ranges[0], RecordKind::MetricValues),
        )
        .unwrap();
        assert_eq!(first_hour.len(), 1);
        assert_eq!(first_hour[0].metric_name, "CPM");
        assert_eq!(first_hour[0].entity_name, "Web");
        assert_eq!(first_hour[0].value, 10);
    }
}
