//! Schema types for the Strata store.
//!
//! This crate describes *what* a store contains at each schema version:
//! entity and attribute descriptions, the version registry that rebuilds
//! every historical model, and the field mappings that carry records from one
//! version to the next. It performs no I/O.

pub mod error;
pub mod mapping;
pub mod model;
pub mod parent_child;
pub mod registry;
pub mod value;
pub mod version;

pub use error::SchemaError;
pub use mapping::{AttributeMapping, AttributeSource, EntityMapping, MigrationStep, RelationshipMapping};
pub use model::{
    AttributeDescription, Cardinality, DeleteRule, EntityDescription, ModelDescription,
    RelationshipDescription,
};
pub use registry::{ModelDelta, SchemaRegistry, VersionedRegistry};
pub use value::{AttributeType, Value};
pub use version::SchemaVersion;
