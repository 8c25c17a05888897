//! Edits staged by the presentation layer until the next save.

use strata_schema::Value;
use strata_store::StoreError;
use strata_store_lmdb::WriteBatch;

/// One staged edit.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Insert {
        entity: String,
        attributes: Vec<(String, Value)>,
    },
    Update {
        entity: String,
        id: u64,
        attributes: Vec<(String, Value)>,
    },
    Delete {
        entity: String,
        id: u64,
    },
    Relate {
        entity: String,
        id: u64,
        relationship: String,
        target: u64,
    },
    Unrelate {
        entity: String,
        id: u64,
        relationship: String,
        target: u64,
    },
}

impl Change {
    pub fn insert<I, K>(entity: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Change::Insert {
            entity: entity.into(),
            attributes: attributes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn update<I, K>(entity: impl Into<String>, id: u64, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Change::Update {
            entity: entity.into(),
            id,
            attributes: attributes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn delete(entity: impl Into<String>, id: u64) -> Self {
        Change::Delete {
            entity: entity.into(),
            id,
        }
    }

    pub fn relate(
        entity: impl Into<String>,
        id: u64,
        relationship: impl Into<String>,
        target: u64,
    ) -> Self {
        Change::Relate {
            entity: entity.into(),
            id,
            relationship: relationship.into(),
            target,
        }
    }

    pub fn unrelate(
        entity: impl Into<String>,
        id: u64,
        relationship: impl Into<String>,
        target: u64,
    ) -> Self {
        Change::Unrelate {
            entity: entity.into(),
            id,
            relationship: relationship.into(),
            target,
        }
    }

    fn apply(&self, batch: &mut WriteBatch<'_>) -> Result<(), StoreError> {
        match self {
            Change::Insert { entity, attributes } => {
                batch.insert(entity, attributes.iter().cloned())?;
            }
            Change::Update {
                entity,
                id,
                attributes,
            } => batch.update(entity, *id, attributes.iter().cloned())?,
            Change::Delete { entity, id } => {
                batch.delete(entity, *id)?;
            }
            Change::Relate {
                entity,
                id,
                relationship,
                target,
            } => batch.relate(entity, *id, relationship, *target)?,
            Change::Unrelate {
                entity,
                id,
                relationship,
                target,
            } => batch.unrelate(entity, *id, relationship, *target)?,
        }
        Ok(())
    }
}

/// Ordered list of staged edits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Take every staged edit, leaving this set empty.
    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(self)
    }

    /// Put `earlier` back in front of whatever was staged since it was taken.
    pub fn restore(&mut self, earlier: ChangeSet) {
        let later = std::mem::replace(&mut self.changes, earlier.changes);
        self.changes.extend(later);
    }

    /// Apply every edit, in order, to `batch`.
    pub fn apply(&self, batch: &mut WriteBatch<'_>) -> Result<usize, StoreError> {
        for change in &self.changes {
            change.apply(batch)?;
        }
        Ok(self.changes.len())
    }
}
