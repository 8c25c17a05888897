//! Read-only access to an available store.

use std::sync::Arc;

use strata_schema::{ModelDescription, SchemaVersion};
use strata_store::{Record, RecordReader, StoreError};
use strata_store_lmdb::{LmdbEnvironment, Snapshot};

/// A handle for non-mutating queries. Any number may be held at once.
///
/// Each query runs in its own read transaction and sees every task committed
/// before it started. Use [`StoreView::read`] when several queries must see
/// the same state.
#[derive(Clone)]
pub struct StoreView {
    env: Arc<LmdbEnvironment>,
}

impl StoreView {
    pub(crate) fn new(env: Arc<LmdbEnvironment>) -> Self {
        Self { env }
    }

    pub fn model(&self) -> &ModelDescription {
        self.env.model()
    }

    /// Run `f` against one consistent snapshot.
    pub fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Snapshot<'_>) -> Result<T, StoreError>,
    {
        let snapshot = self.env.snapshot()?;
        f(&snapshot)
    }

    pub fn schema_version(&self) -> Result<Option<SchemaVersion>, StoreError> {
        self.read(|s| s.schema_version())
    }

    pub fn get(&self, entity: &str, id: u64) -> Result<Option<Record>, StoreError> {
        self.read(|s| s.get(entity, id))
    }

    pub fn fetch(&self, entity: &str) -> Result<Vec<Record>, StoreError> {
        self.read(|s| s.fetch(entity))
    }

    pub fn count(&self, entity: &str) -> Result<u64, StoreError> {
        self.read(|s| s.count(entity))
    }

    pub fn find<F>(&self, entity: &str, predicate: F) -> Result<Vec<Record>, StoreError>
    where
        F: FnMut(&Record) -> bool,
    {
        self.read(|s| s.find(entity, predicate))
    }
}
