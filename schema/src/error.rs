//! Configuration errors raised while building models or migration steps.

use thiserror::Error;

use crate::SchemaVersion;

/// A registry could not produce a model or mapping.
///
/// These are programming errors in the version chain; the store cannot be
/// opened safely while one is present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown schema version {requested} (latest known is {latest})")]
    UnknownVersion {
        requested: SchemaVersion,
        latest: SchemaVersion,
    },

    #[error("schema version {0} has no known successor")]
    NoSuccessor(SchemaVersion),

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("relationship {entity}.{relationship} has an inconsistent inverse: {reason}")]
    InconsistentInverse {
        entity: String,
        relationship: String,
        reason: String,
    },

    #[error("cannot map {entity}.{attribute}: {reason}")]
    Unmappable {
        entity: String,
        attribute: String,
        reason: String,
    },

    #[error("invalid model delta: {0}")]
    InvalidDelta(String),
}
