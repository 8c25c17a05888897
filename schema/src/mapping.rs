//! Single-step migration mappings.
//!
//! A [`MigrationStep`] carries records from model `n` to model `n + 1`. The
//! mapping is inferred from the two models: entities match by name,
//! attributes match by renaming identifier first and name second, and new
//! attributes are filled from their default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{EntityDescription, ModelDescription, SchemaError, SchemaVersion, Value};

/// Where a destination attribute gets its value from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeSource {
    /// Copy the value of the named source attribute.
    Copy(String),
    /// Fill every record with a fixed value.
    Default(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub destination: String,
    pub source: AttributeSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMapping {
    pub destination: String,
    pub source: String,
}

/// How the records of one source entity become records of a destination entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub source: String,
    pub destination: String,
    pub attributes: Vec<AttributeMapping>,
    pub relationships: Vec<RelationshipMapping>,
}

impl EntityMapping {
    /// Build the destination attribute map from a source attribute map.
    ///
    /// A source value that is missing falls back to `Null`; the destination
    /// model was already checked to accept it when the mapping was inferred.
    pub fn map_attributes(&self, source: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .map(|mapping| {
                let value = match &mapping.source {
                    AttributeSource::Copy(name) => source.get(name).cloned().unwrap_or(Value::Null),
                    AttributeSource::Default(value) => value.clone(),
                };
                (mapping.destination.clone(), value)
            })
            .collect()
    }

    pub fn map_relationships(
        &self,
        source: &BTreeMap<String, Vec<u64>>,
    ) -> BTreeMap<String, Vec<u64>> {
        self.relationships
            .iter()
            .filter_map(|mapping| {
                source
                    .get(&mapping.source)
                    .map(|targets| (mapping.destination.clone(), targets.clone()))
            })
            .collect()
    }
}

/// The mapping from `source_model` (version `source_version`) to
/// `destination_model` (version `source_version + 1`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub source_version: SchemaVersion,
    pub source_model: ModelDescription,
    pub destination_model: ModelDescription,
    pub mapping: Vec<EntityMapping>,
}

impl MigrationStep {
    /// Infer the mapping between two adjacent models.
    pub fn infer(
        source_model: ModelDescription,
        destination_model: ModelDescription,
    ) -> Result<Self, SchemaError> {
        if destination_model.version != source_model.version.next() {
            return Err(SchemaError::InvalidDelta(format!(
                "cannot map {} to {}: versions are not adjacent",
                source_model.version, destination_model.version
            )));
        }

        let mapping = destination_model
            .entities
            .iter()
            .filter_map(|destination| {
                source_model
                    .entity(&destination.name)
                    .map(|source| infer_entity(source, destination))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source_version: source_model.version,
            source_model,
            destination_model,
            mapping,
        })
    }

    pub fn destination_version(&self) -> SchemaVersion {
        self.destination_model.version
    }

    pub fn entity_mapping(&self, destination: &str) -> Option<&EntityMapping> {
        self.mapping.iter().find(|m| m.destination == destination)
    }
}

fn infer_entity(
    source: &EntityDescription,
    destination: &EntityDescription,
) -> Result<EntityMapping, SchemaError> {
    let mut attributes = Vec::with_capacity(destination.attributes.len());
    for attribute in &destination.attributes {
        let matched = attribute
            .renaming_id
            .as_deref()
            .and_then(|id| {
                source
                    .attributes
                    .iter()
                    .find(|a| a.renaming_id.as_deref() == Some(id))
            })
            .or_else(|| source.attribute(&attribute.name));

        let mapped = match matched {
            Some(source_attribute) => {
                if source_attribute.attribute_type != attribute.attribute_type {
                    return Err(SchemaError::Unmappable {
                        entity: destination.name.clone(),
                        attribute: attribute.name.clone(),
                        reason: format!(
                            "type changes from {} to {}",
                            source_attribute.attribute_type, attribute.attribute_type
                        ),
                    });
                }
                if source_attribute.optional && !attribute.optional {
                    return Err(SchemaError::Unmappable {
                        entity: destination.name.clone(),
                        attribute: attribute.name.clone(),
                        reason: "optional attribute becomes required".to_string(),
                    });
                }
                AttributeSource::Copy(source_attribute.name.clone())
            }
            None => AttributeSource::Default(attribute.fallback_value().ok_or_else(|| {
                SchemaError::Unmappable {
                    entity: destination.name.clone(),
                    attribute: attribute.name.clone(),
                    reason: "new required attribute has no default".to_string(),
                }
            })?),
        };
        attributes.push(AttributeMapping {
            destination: attribute.name.clone(),
            source: mapped,
        });
    }

    let relationships = destination
        .relationships
        .iter()
        .filter(|rel| source.relationship(&rel.name).is_some())
        .map(|rel| RelationshipMapping {
            destination: rel.name.clone(),
            source: rel.name.clone(),
        })
        .collect();

    Ok(EntityMapping {
        source: source.name.clone(),
        destination: destination.name.clone(),
        attributes,
        relationships,
    })
}
