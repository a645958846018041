use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use harvest_core::raw::RawFlowmap;
use harvest_core::records::ActivityFlowRecord;
use harvest_core::{ArtifactKind, EntityKind, EntityRow, JobInput, JobTarget, RecordKind};
use harvest_fetch::{fetch_if_missing, process_in_chunks};
use harvest_store::{read_json, write_records};

use crate::runner::pipeline::StepContext;
use crate::runner::targets::TargetStep;
use crate::steps::entities::normalized_entities;

const APPLICATION_SCOPE: &str = "application";

/// Flow map scopes of a target: the application plus one per tier, node,
/// backend and business transaction.
pub fn flowmap_scopes(entities: &[EntityRow]) -> Vec<String> {
    let mut scopes = vec![APPLICATION_SCOPE.to_string()];
    scopes.extend(
        entities
            .iter()
            .filter(|e| e.kind() != EntityKind::Application && e.kind().has_flowmap())
            .map(|e| format!("{}.{}", e.kind().file_stem(), e.id())),
    );
    scopes
}

/// Fetch every flow map over the expanded range.
pub struct ExtractFlowmaps;

#[async_trait::async_trait]
impl TargetStep for ExtractFlowmaps {
    fn step_name(&self) -> &'static str {
        "extract_flowmaps"
    }

    fn item_name(&self) -> &'static str {
        "flow maps"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let scopes = flowmap_scopes(&normalized_entities(ctx.storage.as_ref(), target, &tp)?);
        let settings = input.parallelism.for_artifact(ArtifactKind::Flowmaps);
        let range = input.expanded_time_range;
        let (api, storage) = (ctx.api.clone(), ctx.storage.clone());
        let (target, tp) = (Arc::new(target.clone()), Arc::new(tp));

        process_in_chunks(scopes, settings, move |chunk: Vec<String>| {
            let (api, storage) = (api.clone(), storage.clone());
            let (target, tp) = (target.clone(), tp.clone());
            async move {
                let mut count = 0;
                for scope in &chunk {
                    let outcome = fetch_if_missing(storage.as_ref(), &tp.raw_flowmap(scope), || {
                        api.get_flowmap(&target, scope, &range)
                    })
                    .await?;
                    count += usize::from(outcome.was_fetched());
                }
                Ok::<usize, anyhow::Error>(count)
            }
        })
        .await
    }
}

/// Turn flow map edges into activity flow records.
pub struct IndexFlowmaps;

#[async_trait::async_trait]
impl TargetStep for IndexFlowmaps {
    fn step_name(&self) -> &'static str {
        "index_flowmaps"
    }

    fn item_name(&self) -> &'static str {
        "activity flows"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let storage = ctx.storage.as_ref();
        let tp = ctx.paths.target(target);
        let minutes = input.expanded_time_range.duration_minutes().max(1);

        let mut records = Vec::new();
        for scope in flowmap_scopes(&normalized_entities(storage, target, &tp)?) {
            let Some(map) = read_json::<RawFlowmap>(storage, &tp.raw_flowmap(&scope))? else {
                continue;
            };
            records.extend(activity_flows(&scope, &map, minutes));
        }
        records.sort_by(|a, b| {
            (&a.scope, &a.from_name, &a.to_name, &a.exit_type)
                .cmp(&(&b.scope, &b.from_name, &b.to_name, &b.exit_type))
        });
        write_records(storage, &tp.index(RecordKind::ActivityFlows), &records)?;
        Ok(records.len())
    }
}

/// One record per edge. Edges pointing at unknown nodes keep the raw node id
/// as the name.
pub fn activity_flows(scope: &str, map: &RawFlowmap, minutes: i64) -> Vec<ActivityFlowRecord> {
    let nodes: HashMap<&str, (&str, &str)> = map
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), (n.name.as_str(), n.entity_type.as_str())))
        .collect();
    let describe = |id: &str| -> (String, String) {
        match nodes.get(id) {
            Some((name, kind)) => (name.to_string(), kind.to_string()),
            None => (id.to_string(), String::new()),
        }
    };

    map.edges
        .iter()
        .map(|e| {
            let (from_name, from_type) = describe(&e.source_node);
            let (to_name, to_type) = describe(&e.target_node);
            ActivityFlowRecord {
                scope: scope.to_string(),
                from_type,
                from_name,
                to_type,
                to_name,
                exit_type: e.exit_point_type.clone(),
                calls: e.stats.calls,
                calls_per_minute: e.stats.calls / minutes.max(1),
                avg_response_ms: e.stats.average_response_time,
                errors: e.stats.errors,
            }
        })
        .collect()
}
