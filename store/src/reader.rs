//! Read-only record queries.

use crate::{Record, StoreError};

/// Queries shared by read views and write contexts.
pub trait RecordReader {
    fn get(&self, entity: &str, id: u64) -> Result<Option<Record>, StoreError>;

    /// Every record of `entity`, ordered by id.
    fn fetch(&self, entity: &str) -> Result<Vec<Record>, StoreError>;

    fn count(&self, entity: &str) -> Result<u64, StoreError>;

    /// Records of `entity` accepted by `predicate`, ordered by id.
    fn find<F>(&self, entity: &str, mut predicate: F) -> Result<Vec<Record>, StoreError>
    where
        F: FnMut(&Record) -> bool,
        Self: Sized,
    {
        Ok(self
            .fetch(entity)?
            .into_iter()
            .filter(|r| predicate(r))
            .collect())
    }

    /// Like [`get`](Self::get) but a missing record is an error.
    fn require(&self, entity: &str, id: u64) -> Result<Record, StoreError> {
        self.get(entity, id)?
            .ok_or_else(|| StoreError::NotFound(format!("{entity} #{id}")))
    }
}
