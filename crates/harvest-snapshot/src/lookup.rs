use std::collections::HashMap;

use harvest_core::EntityRow;

/// Display names resolved from the extracted entity lists.
#[derive(Debug, Clone, Default)]
pub struct EntityLookup {
    pub applications: HashMap<i64, String>,
    pub tiers: HashMap<i64, String>,
    pub nodes: HashMap<i64, String>,
    pub backends: HashMap<i64, String>,
    pub business_transactions: HashMap<i64, String>,
    /// id → (name, type)
    pub service_endpoints: HashMap<i64, (String, String)>,
    /// id → (name, type)
    pub errors: HashMap<i64, (String, String)>,
}

impl EntityLookup {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a EntityRow>) -> Self {
        let mut lookup = Self::default();
        for row in rows {
            match row {
                EntityRow::Application { id, name, .. } => {
                    lookup.applications.insert(*id, name.clone());
                }
                EntityRow::Tier { id, name, .. } => {
                    lookup.tiers.insert(*id, name.clone());
                }
                EntityRow::Node { id, name, .. } => {
                    lookup.nodes.insert(*id, name.clone());
                }
                EntityRow::Backend { id, name, .. } => {
                    lookup.backends.insert(*id, name.clone());
                }
                EntityRow::BusinessTransaction { id, name, .. } => {
                    lookup.business_transactions.insert(*id, name.clone());
                }
                EntityRow::ServiceEndpoint {
                    id, name, sep_type, ..
                } => {
                    lookup
                        .service_endpoints
                        .insert(*id, (name.clone(), sep_type.clone()));
                }
                EntityRow::Error {
                    id,
                    name,
                    error_type,
                    ..
                } => {
                    lookup.errors.insert(*id, (name.clone(), error_type.clone()));
                }
            }
        }
        lookup
    }

    pub fn tier_name(&self, id: i64) -> Option<&str> {
        self.tiers.get(&id).map(String::as_str)
    }

    pub fn node_name(&self, id: i64) -> Option<&str> {
        self.nodes.get(&id).map(String::as_str)
    }

    pub fn backend_name(&self, id: i64) -> Option<&str> {
        self.backends.get(&id).map(String::as_str)
    }

    pub fn application_name(&self, id: i64) -> Option<&str> {
        self.applications.get(&id).map(String::as_str)
    }

    pub fn bt_name(&self, id: i64) -> Option<&str> {
        self.business_transactions.get(&id).map(String::as_str)
    }

    /// Catalogued error name, empty when the id is unknown.
    pub fn error_name(&self, id: i64) -> &str {
        self.errors.get(&id).map(|(n, _)| n.as_str()).unwrap_or("")
    }

    pub fn error_type(&self, id: i64) -> Option<&str> {
        self.errors.get(&id).map(|(_, t)| t.as_str())
    }

    /// Name of an exit call destination by its entity type.
    pub fn destination_name(&self, entity_type: &str, id: i64) -> Option<&str> {
        match entity_type {
            "APPLICATION_COMPONENT" => self.tier_name(id),
            "BACKEND" => self.backend_name(id),
            "APPLICATION" => self.application_name(id),
            _ => None,
        }
    }
}
