//! Stored records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use strata_schema::{EntityMapping, Value};

/// One stored object: attribute values plus the ids it relates to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub entity: String,
    pub attributes: BTreeMap<String, Value>,
    /// Relationship name to destination ids. To-one relationships hold at
    /// most one id.
    pub relationships: BTreeMap<String, Vec<u64>>,
}

impl Record {
    pub fn new(id: u64, entity: impl Into<String>) -> Self {
        Self {
            id,
            entity: entity.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// The value of `name`, treating a missing attribute as `Null`.
    pub fn value(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&Value::Null)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.value(name).as_str()
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.value(name).as_i64()
    }

    pub fn related(&self, relationship: &str) -> &[u64] {
        self.relationships
            .get(relationship)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rebuild this record in the shape of the mapping's destination entity.
    pub fn migrate(&self, mapping: &EntityMapping) -> Record {
        Record {
            id: self.id,
            entity: mapping.destination.clone(),
            attributes: mapping.map_attributes(&self.attributes),
            relationships: mapping.map_relationships(&self.relationships),
        }
    }
}
