use std::io;
use std::path::PathBuf;

use thiserror::Error;

use strata_schema::{SchemaError, SchemaVersion};

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database '{0}' is missing from the store")]
    MissingDatabase(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("store {0} is still open elsewhere in this process")]
    InUse(PathBuf),
}

impl From<bincode::Error> for LmdbError {
    fn from(e: bincode::Error) -> Self {
        LmdbError::Serialization(e.to_string())
    }
}

impl From<LmdbError> for strata_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::NotFound(key) => strata_store::StoreError::NotFound(key),
            LmdbError::Serialization(msg) => strata_store::StoreError::Serialization(msg),
            LmdbError::Schema(e) => strata_store::StoreError::Schema(e),
            other => strata_store::StoreError::Backend(other.to_string()),
        }
    }
}

/// A migration could not bring the store to the requested version.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("configuration error: {0}")]
    Configuration(#[from] SchemaError),

    #[error("store is at {found}, newer than supported version {supported}")]
    Incompatible {
        found: SchemaVersion,
        supported: SchemaVersion,
    },

    #[error("store carries no schema version")]
    MissingVersion,

    #[error("expected store at {expected}, found {found:?}")]
    VersionMismatch {
        expected: SchemaVersion,
        found: Option<SchemaVersion>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] LmdbError),

    #[error("failed to move {path} into place: {source}")]
    Swap { path: PathBuf, source: io::Error },

    #[error("integrity check failed: {0}")]
    Integrity(String),
}

impl MigrationError {
    /// The registry error behind this failure, if it came from the registry
    /// rather than from the file. Such failures must not be answered by
    /// deleting the store.
    pub fn configuration(&self) -> Option<&SchemaError> {
        match self {
            MigrationError::Configuration(e) | MigrationError::Storage(LmdbError::Schema(e)) => Some(e),
            _ => None,
        }
    }

    /// Another handle in this process still holds the store file open.
    pub fn is_in_use(&self) -> bool {
        matches!(self, MigrationError::Storage(LmdbError::InUse(_)))
    }
}
