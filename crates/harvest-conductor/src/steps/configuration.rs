use anyhow::Result;
use serde_json::Value;

use harvest_core::records::ConfigurationRecord;
use harvest_core::{JobInput, JobTarget, RecordKind};
use harvest_fetch::fetch_if_missing;
use harvest_store::{read_json, write_records};

use crate::runner::pipeline::StepContext;
use crate::runner::targets::TargetStep;

/// Section used for scalar settings at the top of the document.
const ROOT_SECTION: &str = "application";

pub struct ExtractConfiguration;

#[async_trait::async_trait]
impl TargetStep for ExtractConfiguration {
    fn step_name(&self) -> &'static str {
        "extract_configuration"
    }

    fn item_name(&self) -> &'static str {
        "configuration documents"
    }

    async fn run_target(&self, target: &JobTarget, _input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let outcome = fetch_if_missing(ctx.storage.as_ref(), &tp.raw_configuration(), || {
            ctx.api.get_configuration(target)
        })
        .await?;
        Ok(usize::from(outcome.was_fetched()))
    }
}

pub struct IndexConfiguration;

#[async_trait::async_trait]
impl TargetStep for IndexConfiguration {
    fn step_name(&self) -> &'static str {
        "index_configuration"
    }

    fn item_name(&self) -> &'static str {
        "settings"
    }

    async fn run_target(&self, target: &JobTarget, _input: &JobInput, ctx: &StepContext) -> Result<usize> {
        let tp = ctx.paths.target(target);
        let doc: Value = read_json(ctx.storage.as_ref(), &tp.raw_configuration())?.unwrap_or(Value::Null);
        let records = flatten_configuration(&doc);
        write_records(ctx.storage.as_ref(), &tp.index(RecordKind::Configuration), &records)?;
        Ok(records.len())
    }
}

/// Flatten a configuration document into `(section, key, value)` rows.
/// Top-level keys name the section; nested keys are joined with `.` and
/// array elements addressed by index.
pub fn flatten_configuration(doc: &Value) -> Vec<ConfigurationRecord> {
    let mut out = Vec::new();
    let Value::Object(sections) = doc else {
        return out;
    };
    for (section, value) in sections {
        match value {
            Value::Object(_) | Value::Array(_) => flatten_into(section, "", value, &mut out),
            scalar => out.push(ConfigurationRecord {
                section: ROOT_SECTION.to_string(),
                key: section.clone(),
                value: scalar_text(scalar),
            }),
        }
    }
    out
}

fn flatten_into(section: &str, prefix: &str, value: &Value, out: &mut Vec<ConfigurationRecord>) {
    let join = |k: &str| {
        if prefix.is_empty() {
            k.to_string()
        } else {
            format!("{prefix}.{k}")
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(section, &join(k), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(section, &join(&i.to_string()), v, out);
            }
        }
        scalar => out.push(ConfigurationRecord {
            section: section.to_string(),
            key: prefix.to_string(),
            value: scalar_text(scalar),
        }),
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
