//! Write batching: groups every store operation of one exclusive task into a
//! single LMDB write transaction.
//!
//! # Usage
//!
//! ```ignore
//! let mut batch = env.write_batch()?;
//! let parent = batch.insert("Parent", [("orderIndex", Value::Integer(0))])?;
//! let child = batch.insert("Child", [("rating", Value::Integer(5))])?;
//! batch.relate("Parent", parent, "childs", child)?;
//! batch.commit()?;
//! ```
//!
//! If the batch is dropped without calling [`WriteBatch::commit`], all
//! operations are rolled back (the underlying LMDB transaction is aborted).

use std::collections::BTreeMap;

use heed::RwTxn;

use strata_schema::{
    DeleteRule, EntityDescription, ModelDescription, RelationshipDescription, Value,
};
use strata_store::{Record, RecordReader, StoreError};

use crate::environment::LmdbEnvironment;
use crate::records::{delete_record, fetch_records, get_record, put_record};
use crate::{meta, LmdbError};

/// A write batch that groups multiple store operations into a single LMDB
/// write transaction.
pub struct WriteBatch<'a> {
    txn: RwTxn<'a>,
    env: &'a LmdbEnvironment,
}

impl LmdbEnvironment {
    /// Begin a new write batch. Blocks while another write transaction is open.
    pub fn write_batch(&self) -> Result<WriteBatch<'_>, LmdbError> {
        Ok(WriteBatch {
            txn: self.write_txn()?,
            env: self,
        })
    }
}

impl<'a> WriteBatch<'a> {
    pub fn model(&self) -> &'a ModelDescription {
        self.env.model()
    }

    fn entity(&self, name: &str) -> Result<&'a EntityDescription, StoreError> {
        Ok(self.env.model().require_entity(name)?)
    }

    // ── Record operations ───────────────────────────────────────────────

    /// Insert a new record and return its id.
    ///
    /// Attributes left out take their default (or `Null` when optional).
    pub fn insert<I, K>(&mut self, entity: &str, attributes: I) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let description = self.entity(entity)?;
        let mut values: BTreeMap<String, Value> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        validate_attributes(description, &mut values)?;

        let id = meta::read_sequence(&self.env.meta_db, &self.txn, entity)? + 1;
        meta::write_sequence(&self.env.meta_db, &mut self.txn, entity, id)?;

        let record = Record {
            id,
            entity: entity.to_string(),
            attributes: values,
            relationships: BTreeMap::new(),
        };
        let db = self.env.entity_db(entity)?;
        put_record(&db, &mut self.txn, &record)?;
        tracing::trace!(entity, id, "inserted record");
        Ok(id)
    }

    /// Overwrite the given attributes of an existing record.
    pub fn update<I, K>(&mut self, entity: &str, id: u64, attributes: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let description = self.entity(entity)?;
        let mut record = self.require(entity, id)?;
        for (name, value) in attributes {
            record.attributes.insert(name.into(), value);
        }
        validate_attributes(description, &mut record.attributes)?;
        self.put(&record)
    }

    /// Delete a record, applying the delete rule of each of its relationships.
    ///
    /// Returns `false` when no such record exists.
    pub fn delete(&mut self, entity: &str, id: u64) -> Result<bool, StoreError> {
        let description = self.entity(entity)?;
        let Some(record) = self.get(entity, id)? else {
            return Ok(false);
        };

        for rel in &description.relationships {
            if rel.delete_rule == DeleteRule::Deny && !record.related(&rel.name).is_empty() {
                return Err(StoreError::DeleteDenied {
                    entity: entity.to_string(),
                    id,
                    relationship: rel.name.clone(),
                });
            }
        }

        let db = self.env.entity_db(entity)?;
        delete_record(&db, &mut self.txn, id)?;

        for rel in &description.relationships {
            for &target in record.related(&rel.name) {
                match rel.delete_rule {
                    DeleteRule::Cascade => {
                        self.delete(&rel.destination, target)?;
                    }
                    DeleteRule::Nullify => {
                        self.detach(&rel.destination, target, &rel.inverse, id)?;
                    }
                    DeleteRule::Deny | DeleteRule::NoAction => {}
                }
            }
        }
        tracing::trace!(entity, id, "deleted record");
        Ok(true)
    }

    /// Link `entity #id` to `target` through `relationship`, updating the
    /// inverse side. To-one sides drop their previous link.
    pub fn relate(
        &mut self,
        entity: &str,
        id: u64,
        relationship: &str,
        target: u64,
    ) -> Result<(), StoreError> {
        let rel = self.relationship(entity, relationship)?;
        let inverse = self.relationship(&rel.destination, &rel.inverse)?;
        self.require(&rel.destination, target)?;

        if let Some(previous) = self.attach(entity, id, rel, target)? {
            self.detach(&rel.destination, previous, &rel.inverse, id)?;
        }
        if let Some(previous_owner) = self.attach(&rel.destination, target, inverse, id)? {
            self.detach(entity, previous_owner, relationship, target)?;
        }
        Ok(())
    }

    /// Remove the link between `entity #id` and `target` on both sides.
    pub fn unrelate(
        &mut self,
        entity: &str,
        id: u64,
        relationship: &str,
        target: u64,
    ) -> Result<(), StoreError> {
        let rel = self.relationship(entity, relationship)?;
        self.detach(entity, id, relationship, target)?;
        self.detach(&rel.destination, target, &rel.inverse, id)?;
        Ok(())
    }

    /// Commit all operations atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn relationship(
        &self,
        entity: &str,
        name: &str,
    ) -> Result<&'a RelationshipDescription, StoreError> {
        self.entity(entity)?
            .relationship(name)
            .ok_or_else(|| StoreError::validation(entity, format!("no relationship '{name}'")))
    }

    fn put(&mut self, record: &Record) -> Result<(), StoreError> {
        let db = self.env.entity_db(&record.entity)?;
        put_record(&db, &mut self.txn, record)?;
        Ok(())
    }

    /// Add `target` to one side of a relationship. Returns the target a
    /// to-one side pointed at before, if it differs.
    fn attach(
        &mut self,
        entity: &str,
        id: u64,
        rel: &RelationshipDescription,
        target: u64,
    ) -> Result<Option<u64>, StoreError> {
        let mut record = self.require(entity, id)?;
        let links = record.relationships.entry(rel.name.clone()).or_default();
        let previous = if rel.is_to_one() {
            let previous = links.first().copied().filter(|&p| p != target);
            links.clear();
            links.push(target);
            previous
        } else {
            if !links.contains(&target) {
                links.push(target);
            }
            None
        };
        self.put(&record)?;
        Ok(previous)
    }

    /// Remove `target` from one side of a relationship. A missing record is
    /// not an error: it may have been deleted earlier in the same batch.
    fn detach(
        &mut self,
        entity: &str,
        id: u64,
        relationship: &str,
        target: u64,
    ) -> Result<(), StoreError> {
        let Some(mut record) = self.get(entity, id)? else {
            return Ok(());
        };
        if let Some(links) = record.relationships.get_mut(relationship) {
            links.retain(|&t| t != target);
            if links.is_empty() {
                record.relationships.remove(relationship);
            }
            self.put(&record)?;
        }
        Ok(())
    }
}

impl RecordReader for WriteBatch<'_> {
    fn get(&self, entity: &str, id: u64) -> Result<Option<Record>, StoreError> {
        let db = self.env.entity_db(entity)?;
        Ok(get_record(&db, &self.txn, id)?)
    }

    fn fetch(&self, entity: &str) -> Result<Vec<Record>, StoreError> {
        let db = self.env.entity_db(entity)?;
        Ok(fetch_records(&db, &self.txn)?)
    }

    fn count(&self, entity: &str) -> Result<u64, StoreError> {
        let db = self.env.entity_db(entity)?;
        Ok(db.len(&self.txn).map_err(LmdbError::from)?)
    }
}

/// Check `values` against the entity and fill in fallbacks for missing ones.
fn validate_attributes(
    entity: &EntityDescription,
    values: &mut BTreeMap<String, Value>,
) -> Result<(), StoreError> {
    if let Some(unknown) = values.keys().find(|name| entity.attribute(name).is_none()) {
        return Err(StoreError::validation(
            &entity.name,
            format!("unknown attribute '{unknown}'"),
        ));
    }

    for attribute in &entity.attributes {
        match values.get(&attribute.name) {
            Some(value) if !value.is_null() => {
                if !value.matches(attribute.attribute_type) {
                    return Err(StoreError::validation(
                        &entity.name,
                        format!(
                            "attribute '{}' expects {}",
                            attribute.name, attribute.attribute_type
                        ),
                    ));
                }
            }
            _ => {
                let fallback = attribute.fallback_value().ok_or_else(|| {
                    StoreError::validation(
                        &entity.name,
                        format!("attribute '{}' is required", attribute.name),
                    )
                })?;
                values.insert(attribute.name.clone(), fallback);
            }
        }
    }
    Ok(())
}
