use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;

use harvest_core::{EntityKind, EntityRow, JobInput, JobTarget};
use harvest_fetch::fetch_if_missing;
use harvest_store::{read_records, write_records, Storage, TargetPaths};

use crate::runner::pipeline::StepContext;
use crate::runner::targets::TargetStep;

/// Fetch the raw entity list of every kind.
pub struct ExtractEntities;

#[async_trait::async_trait]
impl TargetStep for ExtractEntities {
    fn step_name(&self) -> &'static str {
        "extract_entities"
    }

    fn item_name(&self) -> &'static str {
        "entities"
    }

    async fn run_target(&self, target: &JobTarget, _input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let mut fetched = 0;
        for &kind in EntityKind::ALL {
            let outcome = fetch_if_missing(ctx.storage.as_ref(), &tp.raw_entities(kind), || {
                ctx.api.list_entities(target, kind)
            })
            .await
            .with_context(|| format!("listing {kind}"))?;
            if let harvest_fetch::FetchOutcome::Fetched(n) = outcome {
                tracing::debug!(application = %target.application_name, kind = %kind, count = n, "entities fetched");
                fetched += n;
            }
        }
        Ok(fetched)
    }
}

/// Write the normalized entity rows, one file per kind.
pub struct IndexEntities;

#[async_trait::async_trait]
impl TargetStep for IndexEntities {
    fn step_name(&self) -> &'static str {
        "index_entities"
    }

    fn item_name(&self) -> &'static str {
        "entities"
    }

    async fn run_target(&self, target: &JobTarget, _input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let rows = normalized_entities(ctx.storage.as_ref(), target, &tp)?;
        for &kind in EntityKind::ALL {
            let of_kind: Vec<&EntityRow> = rows.iter().filter(|r| r.kind() == kind).collect();
            write_records(ctx.storage.as_ref(), &tp.entity_index(kind), &of_kind)?;
        }
        Ok(rows.len())
    }
}

/// Normalize the stored raw entity lists of a target, sorted by kind then id.
///
/// Tiers are read first so nodes, transactions, endpoints and errors can carry
/// their tier name. The application itself is synthesized from the validated
/// target when the controller listed none.
pub fn normalized_entities(
    storage: &dyn Storage,
    target: &JobTarget,
    tp: &TargetPaths,
) -> Result<Vec<EntityRow>> {
    let raw_tiers: Vec<Value> = read_records(storage, &tp.raw_entities(EntityKind::Tier))?;
    let tier_names: HashMap<i64, String> = raw_tiers
        .iter()
        .filter_map(|t| EntityRow::from_raw(EntityKind::Tier, t, |_| String::new()))
        .map(|t| (t.id(), t.name().to_string()))
        .collect();
    let tier_name = |id: i64| tier_names.get(&id).cloned().unwrap_or_default();

    let mut rows = Vec::new();
    for &kind in EntityKind::ALL {
        let raw: Vec<Value> = read_records(storage, &tp.raw_entities(kind))?;
        rows.extend(raw.iter().filter_map(|r| EntityRow::from_raw(kind, r, tier_name)));
    }
    if target.application_id != 0 && !rows.iter().any(|r| r.kind() == EntityKind::Application) {
        rows.push(EntityRow::Application {
            id: target.application_id,
            name: target.application_name.clone(),
            description: String::new(),
        });
    }
    rows.sort_by_key(|r| (r.kind(), r.id()));
    rows.dedup_by_key(|r| (r.kind(), r.id()));
    Ok(rows)
}
