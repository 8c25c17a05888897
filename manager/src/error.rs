use std::io;
use std::path::PathBuf;

use thiserror::Error;

use strata_schema::SchemaError;
use strata_store::StoreError;
use strata_store_lmdb::LmdbError;

/// Failures that prevent the store from ever becoming available.
///
/// Every variant is unrecoverable: the background opener logs it and aborts
/// the process.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("schema configuration error: {0}")]
    Configuration(#[from] SchemaError),

    #[error("failed to destroy unusable store file {path}: {source}")]
    Destroy { path: PathBuf, source: io::Error },

    #[error("failed to create a fresh store: {0}")]
    Storage(#[from] LmdbError),

    #[error("failed to start the store opener thread: {0}")]
    Spawn(io::Error),

    /// The file needs migrating or resetting but is still held open by a
    /// handle in this process that uses a different schema version.
    #[error("store {path} is still open under another schema version")]
    InUse { path: PathBuf },
}

/// Outcome of an exclusive task that did not commit.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The task itself returned an error; nothing was written.
    #[error("task aborted: {0}")]
    Aborted(StoreError),

    /// The task succeeded but its writes could not be persisted.
    #[error("failed to persist changes: {0}")]
    Persist(StoreError),

    #[error("exclusive task did not complete: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Schema(#[from] SchemaError),
}
