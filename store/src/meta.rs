//! Metadata storage trait.

use strata_schema::SchemaVersion;

use crate::StoreError;

/// Trait for storing database metadata (schema version, id sequences).
///
/// This is a small key-value store for internal bookkeeping that lives in the
/// same file as the records it describes.
pub trait MetaStore {
    /// Store a metadata value.
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a metadata value, if present.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete a metadata entry.
    fn delete_meta(&self, key: &str) -> Result<(), StoreError>;

    /// The schema version stamped into the store, or `None` for a store that
    /// carries no stamp.
    fn get_schema_version(&self) -> Result<Option<SchemaVersion>, StoreError>;

    /// Stamp the store with `version`.
    fn set_schema_version(&self, version: SchemaVersion) -> Result<(), StoreError>;
}
