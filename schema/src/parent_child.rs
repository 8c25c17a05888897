//! Reference schema chain: parents owning an ordered list of children.
//!
//! | version | change |
//! |---|---|
//! | 0 | `Parent { title1?, orderIndex, childs }`, `Child { text?, rating, parent }` |
//! | 1 | `Parent.email?` added |
//! | 2 | `Parent.title1` renamed to `title2` |
//! | 3 | version bump only |

use crate::{
    AttributeDescription, AttributeType, DeleteRule, EntityDescription, ModelDelta,
    RelationshipDescription, SchemaError, SchemaVersion, VersionedRegistry,
};

pub const STORE_NAME: &str = "Model";
pub const PARENT: &str = "Parent";
pub const CHILD: &str = "Child";

const TITLE_RENAMING_ID: &str = "rename-parent-title1-identifier";

/// Name of the parent's display attribute at `version`.
pub fn parent_title_attribute(version: SchemaVersion) -> &'static str {
    if version < SchemaVersion::new(2) {
        "title1"
    } else {
        "title2"
    }
}

fn base() -> Vec<EntityDescription> {
    let parent = EntityDescription::new(PARENT)
        .with_attribute(
            AttributeDescription::new("title1", AttributeType::String)
                .optional()
                .with_renaming_id(TITLE_RENAMING_ID),
        )
        .with_attribute(AttributeDescription::new("orderIndex", AttributeType::Integer64))
        .with_relationship(
            RelationshipDescription::to_many("childs", CHILD, "parent")
                .with_delete_rule(DeleteRule::Cascade),
        );

    let child = EntityDescription::new(CHILD)
        .with_attribute(AttributeDescription::new("text", AttributeType::String).optional())
        .with_attribute(AttributeDescription::new("rating", AttributeType::Integer64))
        .with_relationship(
            RelationshipDescription::to_one("parent", PARENT, "childs")
                .with_delete_rule(DeleteRule::Nullify),
        );

    vec![parent, child]
}

/// The full chain, current at its latest version.
pub fn registry() -> VersionedRegistry {
    VersionedRegistry::new(STORE_NAME, base())
        .with_delta(ModelDelta::AddAttribute {
            entity: PARENT.to_string(),
            attribute: AttributeDescription::new("email", AttributeType::String).optional(),
        })
        .with_delta(ModelDelta::RenameAttribute {
            entity: PARENT.to_string(),
            from: "title1".to_string(),
            to: "title2".to_string(),
        })
        // TODO: turn into a data step once mappings can transform values
        // (every Child.rating + 1).
        .with_delta(ModelDelta::Bump)
}

/// The chain pinned at `version`, or at its latest version when `None`.
pub fn registry_at(version: Option<SchemaVersion>) -> Result<VersionedRegistry, SchemaError> {
    match version {
        Some(version) => registry().with_current_version(version),
        None => Ok(registry()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeSource, SchemaRegistry};

    #[test]
    fn chain_is_current_at_three() {
        assert_eq!(registry().current_version(), SchemaVersion::new(3));
    }

    #[test]
    fn every_version_validates() {
        let r = registry();
        for v in 0..=3 {
            r.model_for(SchemaVersion::new(v)).unwrap();
        }
    }

    #[test]
    fn rename_step_copies_title() {
        let step = registry().migration_step(SchemaVersion::new(1)).unwrap();
        let parent = step.entity_mapping(PARENT).unwrap();
        let title = parent
            .attributes
            .iter()
            .find(|m| m.destination == "title2")
            .unwrap();
        assert_eq!(title.source, AttributeSource::Copy("title1".into()));
    }

    #[test]
    fn title_attribute_follows_version() {
        assert_eq!(parent_title_attribute(SchemaVersion::new(1)), "title1");
        assert_eq!(parent_title_attribute(SchemaVersion::new(3)), "title2");
    }

    #[test]
    fn pinned_registry_stops_at_version() {
        let r = registry_at(Some(SchemaVersion::new(1))).unwrap();
        assert_eq!(r.current_version(), SchemaVersion::new(1));
        assert!(registry_at(Some(SchemaVersion::new(9))).is_err());
    }
}
