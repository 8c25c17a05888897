//! Object-model descriptions.
//!
//! A [`ModelDescription`] is plain data: a version stamp and the entities a
//! store of that version holds. Registries build one per version and the
//! migration mapping is inferred by comparing two of them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{AttributeType, SchemaError, SchemaVersion, Value};

/// How many records a relationship may point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// What happens to the destination records when a source record is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteRule {
    /// Remove the back-reference from every destination record.
    Nullify,
    /// Delete every destination record as well.
    Cascade,
    /// Refuse the delete while any destination record exists.
    Deny,
    /// Leave destination records untouched.
    NoAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    pub attribute_type: AttributeType,
    pub optional: bool,
    /// Value used when a record has no value for this attribute.
    pub default: Option<Value>,
    /// Stable identifier that survives renames across versions.
    pub renaming_id: Option<String>,
}

impl AttributeDescription {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            optional: false,
            default: None,
            renaming_id: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_renaming_id(mut self, id: impl Into<String>) -> Self {
        self.renaming_id = Some(id.into());
        self
    }

    /// The value a record gets when nothing else provides one.
    pub fn fallback_value(&self) -> Option<Value> {
        match (&self.default, self.optional) {
            (Some(value), _) => Some(value.clone()),
            (None, true) => Some(Value::Null),
            (None, false) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescription {
    pub name: String,
    /// Name of the destination entity.
    pub destination: String,
    /// Name of the inverse relationship on the destination entity.
    pub inverse: String,
    pub cardinality: Cardinality,
    pub optional: bool,
    pub delete_rule: DeleteRule,
}

impl RelationshipDescription {
    pub fn to_one(
        name: impl Into<String>,
        destination: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            inverse: inverse.into(),
            cardinality: Cardinality::ToOne,
            optional: true,
            delete_rule: DeleteRule::Nullify,
        }
    }

    pub fn to_many(
        name: impl Into<String>,
        destination: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::ToMany,
            ..Self::to_one(name, destination, inverse)
        }
    }

    pub fn with_delete_rule(mut self, rule: DeleteRule) -> Self {
        self.delete_rule = rule;
        self
    }

    pub fn is_to_one(&self) -> bool {
        self.cardinality == Cardinality::ToOne
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    pub attributes: Vec<AttributeDescription>,
    pub relationships: Vec<RelationshipDescription>,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDescription) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipDescription) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut AttributeDescription> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescription> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// The full object model of one schema version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub version: SchemaVersion,
    pub entities: Vec<EntityDescription>,
}

impl ModelDescription {
    pub fn new(version: SchemaVersion, entities: Vec<EntityDescription>) -> Self {
        Self { version, entities }
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut EntityDescription> {
        self.entities.iter_mut().find(|e| e.name == name)
    }

    /// Like [`entity`](Self::entity) but reports a missing entity as an error.
    pub fn require_entity(&self, name: &str) -> Result<&EntityDescription, SchemaError> {
        self.entity(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }

    /// Check the structural invariants of the model.
    ///
    /// Names are unique per scope and every relationship has an inverse on
    /// its destination entity that points straight back at it.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut entity_names = HashSet::new();
        for entity in &self.entities {
            if !entity_names.insert(entity.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    kind: "entity",
                    name: entity.name.clone(),
                });
            }

            let mut property_names = HashSet::new();
            let properties = entity
                .attributes
                .iter()
                .map(|a| &a.name)
                .chain(entity.relationships.iter().map(|r| &r.name));
            for name in properties {
                if !property_names.insert(name.as_str()) {
                    return Err(SchemaError::Duplicate {
                        kind: "property",
                        name: format!("{}.{}", entity.name, name),
                    });
                }
            }

            for attribute in &entity.attributes {
                if let Some(default) = &attribute.default {
                    if (default.is_null() && !attribute.optional)
                        || !default.matches(attribute.attribute_type)
                    {
                        return Err(SchemaError::Unmappable {
                            entity: entity.name.clone(),
                            attribute: attribute.name.clone(),
                            reason: format!("default does not fit {}", attribute.attribute_type),
                        });
                    }
                }
            }
        }

        for entity in &self.entities {
            for rel in &entity.relationships {
                self.check_inverse(entity, rel)?;
            }
        }
        Ok(())
    }

    fn check_inverse(
        &self,
        entity: &EntityDescription,
        rel: &RelationshipDescription,
    ) -> Result<(), SchemaError> {
        let fail = |reason: String| SchemaError::InconsistentInverse {
            entity: entity.name.clone(),
            relationship: rel.name.clone(),
            reason,
        };

        let destination = self
            .entity(&rel.destination)
            .ok_or_else(|| fail(format!("destination '{}' does not exist", rel.destination)))?;
        let inverse = destination.relationship(&rel.inverse).ok_or_else(|| {
            fail(format!(
                "'{}' has no relationship '{}'",
                destination.name, rel.inverse
            ))
        })?;
        if inverse.destination != entity.name {
            return Err(fail(format!(
                "inverse points at '{}'",
                inverse.destination
            )));
        }
        if inverse.inverse != rel.name {
            return Err(fail(format!(
                "inverse names '{}' as its own inverse",
                inverse.inverse
            )));
        }
        Ok(())
    }
}
