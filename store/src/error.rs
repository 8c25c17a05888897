use thiserror::Error;

use strata_schema::SchemaError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("invalid record for {entity}: {reason}")]
    Validation { entity: String, reason: String },

    #[error("delete of {entity} #{id} denied by relationship '{relationship}'")]
    DeleteDenied {
        entity: String,
        id: u64,
        relationship: String,
    },

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl StoreError {
    pub fn validation(entity: &str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            entity: entity.to_string(),
            reason: reason.into(),
        }
    }
}
