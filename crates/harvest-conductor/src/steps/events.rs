use anyhow::Result;
use std::collections::HashSet;

use harvest_core::raw::RawEvent;
use harvest_core::records::EventRecord;
use harvest_core::time_range::millis_to_rfc3339;
use harvest_core::{JobInput, JobTarget, RecordKind};
use harvest_fetch::fetch_if_missing;
use harvest_store::{read_records, write_records};

use crate::runner::pipeline::StepContext;
use crate::runner::targets::TargetStep;

/// Fetch controller events, one listing per hour.
pub struct ExtractEvents;

#[async_trait::async_trait]
impl TargetStep for ExtractEvents {
    fn step_name(&self) -> &'static str {
        "extract_events"
    }

    fn item_name(&self) -> &'static str {
        "events"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let mut fetched = 0;
        for hour in &input.hourly_time_ranges {
            let outcome = fetch_if_missing(ctx.storage.as_ref(), &tp.raw_events(hour), || {
                ctx.api.get_events(target, hour)
            })
            .await?;
            if let harvest_fetch::FetchOutcome::Fetched(n) = outcome {
                fetched += n;
            }
        }
        Ok(fetched)
    }
}

pub struct IndexEvents;

#[async_trait::async_trait]
impl TargetStep for IndexEvents {
    fn step_name(&self) -> &'static str {
        "index_events"
    }

    fn item_name(&self) -> &'static str {
        "events"
    }

    async fn run_target(&self, target: &JobTarget, input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let storage = ctx.storage.as_ref();
        let tp = ctx.paths.target(target);

        let mut all = Vec::new();
        for hour in &input.hourly_time_ranges {
            let raw: Vec<RawEvent> = read_records(storage, &tp.raw_events(hour))?;
            let records: Vec<EventRecord> = raw.iter().map(event_record).collect();
            write_records(storage, &tp.hour_index(hour, RecordKind::Events), &records)?;
            all.extend(records);
        }

        let mut seen = HashSet::new();
        all.retain(|e| seen.insert(e.event_id));
        all.sort_by_key(|e| (e.occurred_millis, e.event_id));
        write_records(storage, &tp.index(RecordKind::Events), &all)?;
        Ok(all.len())
    }
}

fn event_record(e: &RawEvent) -> EventRecord {
    EventRecord {
        event_id: e.id,
        event_type: e.event_type.clone(),
        sub_type: e.subtype.clone(),
        severity: e.severity.clone(),
        summary: e.summary.clone(),
        occurred: millis_to_rfc3339(e.event_time),
        occurred_millis: e.event_time,
        tier_name: e.tier_name.clone(),
        node_name: e.node_name.clone(),
        bt_name: e.business_transaction_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::{context, input, valid_target, write_json};
    use serde_json::json;

    #[tokio::test]
    async fn events_split_by_hour_and_aggregate_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let input = input();
        let h0 = input.hourly_time_ranges[0].from_millis();
        let h1 = input.hourly_time_ranges[1].from_millis();
        write_json(
            &tmp.path().join("replay/shop/events.json"),
            json!([
                {"id": 2, "type": "APPLICATION_DEPLOYMENT", "eventTime": h1 + 5},
                {"id": 1, "type": "POLICY_OPEN_CRITICAL", "severity": "ERROR", "eventTime": h0 + 5},
                {"id": 3, "type": "POLICY_CLOSE", "eventTime": h1 + 3_600_000}
            ]),
        );
        let ctx = context(tmp.path());
        let target = valid_target("shop", 42);

        assert_eq!(ExtractEvents.run_target(&target, &input, &ctx).await.unwrap(), 2);
        assert_eq!(IndexEvents.run_target(&target, &input, &ctx).await.unwrap(), 2);

        let tp = ctx.paths.target(&target);
        let all: Vec<EventRecord> = read_records(ctx.storage.as_ref(), &tp.index(RecordKind::Events)).unwrap();
        assert_eq!(all.iter().map(|e| e.event_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(all[0].severity, "ERROR");
        assert!(all[0].occurred.starts_with("2024-01-31T13:00:00"));
    }
}
