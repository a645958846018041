//! Monitored entity kinds and their normalized rows.
//!
//! Entity kinds form a closed set; kind-specific behavior (file naming, metric
//! paths, raw field mapping) lives on the enums instead of in type checks
//! scattered through the steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::ArtifactKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Application,
    Tier,
    Node,
    Backend,
    BusinessTransaction,
    ServiceEndpoint,
    Error,
}

impl EntityKind {
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::Application,
        EntityKind::Tier,
        EntityKind::Node,
        EntityKind::Backend,
        EntityKind::BusinessTransaction,
        EntityKind::ServiceEndpoint,
        EntityKind::Error,
    ];

    /// File stem for this kind's entity list.
    pub fn file_stem(self) -> &'static str {
        match self {
            EntityKind::Application => "applications",
            EntityKind::Tier => "tiers",
            EntityKind::Node => "nodes",
            EntityKind::Backend => "backends",
            EntityKind::BusinessTransaction => "business_transactions",
            EntityKind::ServiceEndpoint => "service_endpoints",
            EntityKind::Error => "errors",
        }
    }

    /// Chunking bucket used when fanning out per-entity fetches.
    pub fn artifact(self) -> ArtifactKind {
        match self {
            EntityKind::Application | EntityKind::Tier => ArtifactKind::Tiers,
            EntityKind::Node => ArtifactKind::Nodes,
            EntityKind::Backend => ArtifactKind::Backends,
            EntityKind::BusinessTransaction => ArtifactKind::BusinessTransactions,
            EntityKind::ServiceEndpoint => ArtifactKind::ServiceEndpoints,
            EntityKind::Error => ArtifactKind::Errors,
        }
    }

    /// Kinds that get their own flow map.
    pub fn has_flowmap(self) -> bool {
        matches!(
            self,
            EntityKind::Application
                | EntityKind::Tier
                | EntityKind::Node
                | EntityKind::Backend
                | EntityKind::BusinessTransaction
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One metric to fetch for an entity: short name for file naming plus the
/// full metric browser path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricPath {
    pub short_name: &'static str,
    pub path: String,
}

const ART: &str = "Average Response Time (ms)";
const CPM: &str = "Calls per Minute";
const EPM: &str = "Errors per Minute";

fn standard_metrics(prefix: &str) -> Vec<MetricPath> {
    vec![
        MetricPath {
            short_name: "ART",
            path: format!("{prefix}|{ART}"),
        },
        MetricPath {
            short_name: "CPM",
            path: format!("{prefix}|{CPM}"),
        },
        MetricPath {
            short_name: "EPM",
            path: format!("{prefix}|{EPM}"),
        },
    ]
}

/// A normalized entity. Serialized with a `kind` discriminant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRow {
    Application {
        id: i64,
        name: String,
        #[serde(default)]
        description: String,
    },
    Tier {
        id: i64,
        name: String,
        #[serde(default)]
        agent_type: String,
        #[serde(default)]
        num_nodes: i64,
    },
    Node {
        id: i64,
        name: String,
        tier_id: i64,
        tier_name: String,
        #[serde(default)]
        agent_type: String,
        #[serde(default)]
        machine_name: String,
    },
    Backend {
        id: i64,
        name: String,
        #[serde(default)]
        backend_type: String,
    },
    BusinessTransaction {
        id: i64,
        name: String,
        #[serde(default)]
        bt_type: String,
        tier_id: i64,
        tier_name: String,
    },
    ServiceEndpoint {
        id: i64,
        name: String,
        #[serde(default)]
        sep_type: String,
        tier_id: i64,
        tier_name: String,
    },
    Error {
        id: i64,
        name: String,
        #[serde(default)]
        error_type: String,
        tier_id: i64,
        tier_name: String,
    },
}

fn get_i64(v: &Value, key: &str) -> i64 {
    v.get(key)
        .and_then(|x| x.as_i64().or_else(|| x.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0)
}

fn get_str(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or("")
        .to_string()
}

/// Classify an error entity from its name when the controller omits a type.
pub fn classify_error_name(name: &str) -> &'static str {
    if name.starts_with("HTTP Error Code") || name.starts_with("HTTP error") {
        "HTTP"
    } else if name.contains("Exception") {
        "Exception"
    } else if name.contains("Error") {
        "Error"
    } else {
        "Custom"
    }
}

impl EntityRow {
    /// Normalize one raw controller row. Rows without an id are dropped.
    /// `tier_name` resolves tier ids for kinds whose payload carries only the id.
    pub fn from_raw(kind: EntityKind, raw: &Value, tier_name: impl Fn(i64) -> String) -> Option<Self> {
        let id = get_i64(raw, "id");
        if id == 0 {
            return None;
        }
        let name = get_str(raw, "name");
        let row = match kind {
            EntityKind::Application => EntityRow::Application {
                id,
                name,
                description: get_str(raw, "description"),
            },
            EntityKind::Tier => EntityRow::Tier {
                id,
                name,
                agent_type: get_str(raw, "agentType"),
                num_nodes: get_i64(raw, "numberOfNodes"),
            },
            EntityKind::Node => {
                let tier_id = get_i64(raw, "tierId");
                let mut tier = get_str(raw, "tierName");
                if tier.is_empty() {
                    tier = tier_name(tier_id);
                }
                EntityRow::Node {
                    id,
                    name,
                    tier_id,
                    tier_name: tier,
                    agent_type: get_str(raw, "agentType"),
                    machine_name: get_str(raw, "machineName"),
                }
            }
            EntityKind::Backend => EntityRow::Backend {
                id,
                name,
                backend_type: get_str(raw, "exitPointType"),
            },
            EntityKind::BusinessTransaction => {
                let tier_id = get_i64(raw, "tierId");
                let mut tier = get_str(raw, "tierName");
                if tier.is_empty() {
                    tier = tier_name(tier_id);
                }
                EntityRow::BusinessTransaction {
                    id,
                    name,
                    bt_type: get_str(raw, "entryPointType"),
                    tier_id,
                    tier_name: tier,
                }
            }
            EntityKind::ServiceEndpoint => {
                let tier_id = get_i64(raw, "applicationComponentId");
                EntityRow::ServiceEndpoint {
                    id,
                    name,
                    sep_type: get_str(raw, "type"),
                    tier_id,
                    tier_name: tier_name(tier_id),
                }
            }
            EntityKind::Error => {
                let tier_id = get_i64(raw, "applicationComponentId");
                let mut error_type = get_str(raw, "type");
                if error_type.is_empty() {
                    error_type = classify_error_name(&name).to_string();
                }
                EntityRow::Error {
                    id,
                    name,
                    error_type,
                    tier_id,
                    tier_name: tier_name(tier_id),
                }
            }
        };
        Some(row)
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRow::Application { .. } => EntityKind::Application,
            EntityRow::Tier { .. } => EntityKind::Tier,
            EntityRow::Node { .. } => EntityKind::Node,
            EntityRow::Backend { .. } => EntityKind::Backend,
            EntityRow::BusinessTransaction { .. } => EntityKind::BusinessTransaction,
            EntityRow::ServiceEndpoint { .. } => EntityKind::ServiceEndpoint,
            EntityRow::Error { .. } => EntityKind::Error,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            EntityRow::Application { id, .. }
            | EntityRow::Tier { id, .. }
            | EntityRow::Node { id, .. }
            | EntityRow::Backend { id, .. }
            | EntityRow::BusinessTransaction { id, .. }
            | EntityRow::ServiceEndpoint { id, .. }
            | EntityRow::Error { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityRow::Application { name, .. }
            | EntityRow::Tier { name, .. }
            | EntityRow::Node { name, .. }
            | EntityRow::Backend { name, .. }
            | EntityRow::BusinessTransaction { name, .. }
            | EntityRow::ServiceEndpoint { name, .. }
            | EntityRow::Error { name, .. } => name,
        }
    }

    /// Metric browser paths to harvest for this entity.
    pub fn metric_paths(&self) -> Vec<MetricPath> {
        match self {
            EntityRow::Application { .. } => standard_metrics("Overall Application Performance"),
            EntityRow::Tier { name, .. } => {
                standard_metrics(&format!("Overall Application Performance|{name}"))
            }
            EntityRow::Node {
                name, tier_name, ..
            } => standard_metrics(&format!(
                "Overall Application Performance|{tier_name}|Individual Nodes|{name}"
            )),
            EntityRow::Backend { name, .. } => standard_metrics(&format!("Backends|{name}")),
            EntityRow::BusinessTransaction {
                name, tier_name, ..
            } => standard_metrics(&format!(
                "Business Transaction Performance|Business Transactions|{tier_name}|{name}"
            )),
            EntityRow::ServiceEndpoint {
                name, tier_name, ..
            } => standard_metrics(&format!("Service Endpoints|{tier_name}|{name}")),
            EntityRow::Error {
                name, tier_name, ..
            } => vec![MetricPath {
                short_name: "EPM",
                path: format!("Errors|{tier_name}|{name}|{EPM}"),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tier_lookup(id: i64) -> String {
        if id == 7 {
            "Web".into()
        } else {
            String::new()
        }
    }

    #[test]
    fn node_row_from_raw() {
        let raw = json!({"id": 11, "name": "web-1", "tierId": 7, "tierName": "Web", "agentType": "JAVA", "machineName": "host-a"});
        let row = EntityRow::from_raw(EntityKind::Node, &raw, tier_lookup).unwrap();
        assert_eq!(row.kind(), EntityKind::Node);
        assert_eq!(row.id(), 11);
        assert_eq!(row.name(), "web-1");
        assert_eq!(
            row.metric_paths()[0].path,
            "Overall Application Performance|Web|Individual Nodes|web-1|Average Response Time (ms)"
        );
    }

    #[test]
    fn error_type_classified_when_missing() {
        let raw = json!({"id": "100", "name": "NullPointerException", "applicationComponentId": 7});
        let row = EntityRow::from_raw(EntityKind::Error, &raw, tier_lookup).unwrap();
        match row {
            EntityRow::Error {
                error_type,
                tier_name,
                ..
            } => {
                assert_eq!(error_type, "Exception");
                assert_eq!(tier_name, "Web");
            }
            other => panic!("unexpected row {other:?}"),
        }
    }

    #[test]
    fn rows_without_id_are_dropped() {
        let raw = json!({"name": "orphan"});
        assert!(EntityRow::from_raw(EntityKind::Tier, &raw, tier_lookup).is_none());
    }

    #[test]
    fn rows_serialize_with_kind_tag() {
        let row = EntityRow::Backend {
            id: 3,
            name: "ORCL".into(),
            backend_type: "JDBC".into(),
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["kind"], "backend");
        let back: EntityRow = serde_json::from_value(v).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn error_entities_have_single_metric() {
        let row = EntityRow::Error {
            id: 1,
            name: "Timeout".into(),
            error_type: "Custom".into(),
            tier_id: 7,
            tier_name: "Web".into(),
        };
        let paths = row.metric_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].short_name, "EPM");
    }
}
