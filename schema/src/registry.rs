//! Schema version registry.
//!
//! A registry is the pluggable policy that tells the store which model is
//! current and how to rebuild every older one. [`VersionedRegistry`] keeps a
//! base model plus one [`ModelDelta`] per version, so model `n` is always
//! model `n - 1` with one more delta applied.

use crate::{
    AttributeDescription, EntityDescription, MigrationStep, ModelDescription, SchemaError,
    SchemaVersion,
};

/// Source of model descriptions and migration steps for one store.
pub trait SchemaRegistry: Send + Sync {
    /// Base name of the store file.
    fn store_name(&self) -> &str;

    /// The version fresh stores are created at and older stores migrate to.
    fn current_version(&self) -> SchemaVersion;

    /// The model of `version`. Deterministic for a given registry.
    fn model_for(&self, version: SchemaVersion) -> Result<ModelDescription, SchemaError>;

    /// The mapping from `from` to `from + 1`.
    fn migration_step(&self, from: SchemaVersion) -> Result<MigrationStep, SchemaError> {
        if from >= self.current_version() {
            return Err(SchemaError::NoSuccessor(from));
        }
        let source = self.model_for(from)?;
        let destination = self.model_for(from.next())?;
        MigrationStep::infer(source, destination)
    }
}

/// A structural change from one version to the next.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelDelta {
    AddAttribute {
        entity: String,
        attribute: AttributeDescription,
    },
    RenameAttribute {
        entity: String,
        from: String,
        to: String,
    },
    RemoveAttribute {
        entity: String,
        name: String,
    },
    AddEntity(EntityDescription),
    /// Version bump with no structural change.
    Bump,
}

impl ModelDelta {
    fn apply(&self, model: &mut ModelDescription) -> Result<(), SchemaError> {
        match self {
            ModelDelta::AddAttribute { entity, attribute } => {
                let target = entity_mut(model, entity)?;
                if target.attribute(&attribute.name).is_some() {
                    return Err(SchemaError::Duplicate {
                        kind: "attribute",
                        name: format!("{}.{}", entity, attribute.name),
                    });
                }
                target.attributes.push(attribute.clone());
            }
            ModelDelta::RenameAttribute { entity, from, to } => {
                let target = entity_mut(model, entity)?;
                let attribute = target.attribute_mut(from).ok_or_else(|| {
                    SchemaError::InvalidDelta(format!("{entity}.{from} does not exist"))
                })?;
                attribute.name = to.clone();
            }
            ModelDelta::RemoveAttribute { entity, name } => {
                let target = entity_mut(model, entity)?;
                let before = target.attributes.len();
                target.attributes.retain(|a| &a.name != name);
                if target.attributes.len() == before {
                    return Err(SchemaError::InvalidDelta(format!(
                        "{entity}.{name} does not exist"
                    )));
                }
            }
            ModelDelta::AddEntity(entity) => {
                if model.entity(&entity.name).is_some() {
                    return Err(SchemaError::Duplicate {
                        kind: "entity",
                        name: entity.name.clone(),
                    });
                }
                model.entities.push(entity.clone());
            }
            ModelDelta::Bump => {}
        }
        Ok(())
    }
}

fn entity_mut<'m>(
    model: &'m mut ModelDescription,
    name: &str,
) -> Result<&'m mut EntityDescription, SchemaError> {
    model
        .entity_mut(name)
        .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
}

/// Registry built from a base model and an ordered list of deltas.
#[derive(Clone, Debug)]
pub struct VersionedRegistry {
    store_name: String,
    base: Vec<EntityDescription>,
    deltas: Vec<ModelDelta>,
    current: SchemaVersion,
}

impl VersionedRegistry {
    /// A registry whose only version is `0`, holding `base`.
    pub fn new(store_name: impl Into<String>, base: Vec<EntityDescription>) -> Self {
        Self {
            store_name: store_name.into(),
            base,
            deltas: Vec::new(),
            current: SchemaVersion::INITIAL,
        }
    }

    /// Append the delta producing the next version and make it current.
    pub fn with_delta(mut self, delta: ModelDelta) -> Self {
        self.deltas.push(delta);
        self.current = self.latest_version();
        self
    }

    /// Pin the current version below the latest known one.
    pub fn with_current_version(mut self, version: SchemaVersion) -> Result<Self, SchemaError> {
        if version > self.latest_version() {
            return Err(SchemaError::UnknownVersion {
                requested: version,
                latest: self.latest_version(),
            });
        }
        self.current = version;
        Ok(self)
    }

    pub fn latest_version(&self) -> SchemaVersion {
        SchemaVersion::new(self.deltas.len() as u32)
    }
}

impl SchemaRegistry for VersionedRegistry {
    fn store_name(&self) -> &str {
        &self.store_name
    }

    fn current_version(&self) -> SchemaVersion {
        self.current
    }

    fn model_for(&self, version: SchemaVersion) -> Result<ModelDescription, SchemaError> {
        if version > self.current {
            return Err(SchemaError::UnknownVersion {
                requested: version,
                latest: self.current,
            });
        }

        let mut model = ModelDescription::new(SchemaVersion::INITIAL, self.base.clone());
        for delta in &self.deltas[..version.get() as usize] {
            delta.apply(&mut model)?;
            model.version = model.version.next();
        }
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeType, Value};

    fn registry() -> VersionedRegistry {
        VersionedRegistry::new(
            "Notes",
            vec![EntityDescription::new("Note")
                .with_attribute(AttributeDescription::new("body", AttributeType::String))],
        )
        .with_delta(ModelDelta::AddAttribute {
            entity: "Note".into(),
            attribute: AttributeDescription::new("pinned", AttributeType::Boolean)
                .with_default(Value::Boolean(false)),
        })
        .with_delta(ModelDelta::RenameAttribute {
            entity: "Note".into(),
            from: "body".into(),
            to: "text".into(),
        })
    }

    #[test]
    fn current_defaults_to_latest() {
        let r = registry();
        assert_eq!(r.current_version(), SchemaVersion::new(2));
        assert_eq!(r.latest_version(), SchemaVersion::new(2));
    }

    #[test]
    fn every_historical_model_is_reproducible() {
        let r = registry();
        let v0 = r.model_for(SchemaVersion::new(0)).unwrap();
        let v1 = r.model_for(SchemaVersion::new(1)).unwrap();
        let v2 = r.model_for(SchemaVersion::new(2)).unwrap();

        assert!(v0.entity("Note").unwrap().attribute("pinned").is_none());
        assert!(v1.entity("Note").unwrap().attribute("pinned").is_some());
        assert!(v1.entity("Note").unwrap().attribute("body").is_some());
        assert!(v2.entity("Note").unwrap().attribute("text").is_some());
        assert_eq!(v2.version, SchemaVersion::new(2));
    }

    #[test]
    fn versions_beyond_current_are_unknown() {
        let r = registry().with_current_version(SchemaVersion::new(1)).unwrap();
        assert!(matches!(
            r.model_for(SchemaVersion::new(2)),
            Err(SchemaError::UnknownVersion { .. })
        ));
        assert_eq!(
            r.migration_step(SchemaVersion::new(1)).unwrap_err(),
            SchemaError::NoSuccessor(SchemaVersion::new(1))
        );
    }

    #[test]
    fn pinning_past_latest_fails() {
        assert!(registry()
            .with_current_version(SchemaVersion::new(3))
            .is_err());
    }

    #[test]
    fn rename_without_renaming_id_loses_the_value() {
        // Name matching alone cannot follow a rename, so the new attribute
        // needs a default or the step is rejected.
        let r = registry();
        assert!(r.migration_step(SchemaVersion::new(1)).is_err());
    }

    #[test]
    fn bad_delta_surfaces_from_model_for() {
        let r = VersionedRegistry::new("Broken", vec![EntityDescription::new("A")]).with_delta(
            ModelDelta::RemoveAttribute {
                entity: "A".into(),
                name: "missing".into(),
            },
        );
        assert!(matches!(
            r.model_for(SchemaVersion::new(1)),
            Err(SchemaError::InvalidDelta(_))
        ));
    }
}
