//! Record encoding and read-only snapshots.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use strata_schema::SchemaVersion;
use strata_store::{Record, RecordReader, StoreError};

use crate::environment::LmdbEnvironment;
use crate::{meta, LmdbError};

/// Records are keyed by big-endian id so iteration follows id order.
fn record_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn get_record(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn<'_>,
    id: u64,
) -> Result<Option<Record>, LmdbError> {
    match db.get(txn, record_key(id).as_slice())? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn fetch_records(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn<'_>,
) -> Result<Vec<Record>, LmdbError> {
    let mut records = Vec::new();
    for result in db.iter(txn)? {
        let (_, bytes) = result?;
        records.push(bincode::deserialize(bytes)?);
    }
    Ok(records)
}

pub(crate) fn put_record(
    db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn<'_>,
    record: &Record,
) -> Result<(), LmdbError> {
    let bytes = bincode::serialize(record)?;
    db.put(wtxn, record_key(record.id).as_slice(), &bytes)?;
    Ok(())
}

pub(crate) fn delete_record(
    db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn<'_>,
    id: u64,
) -> Result<bool, LmdbError> {
    Ok(db.delete(wtxn, record_key(id).as_slice())?)
}

/// A consistent read-only view of the store at one point in time.
///
/// Holds an LMDB read transaction; writes committed after the snapshot was
/// taken are not visible through it.
pub struct Snapshot<'env> {
    env: &'env LmdbEnvironment,
    txn: RoTxn<'env>,
}

impl LmdbEnvironment {
    pub fn snapshot(&self) -> Result<Snapshot<'_>, LmdbError> {
        Ok(Snapshot {
            env: self,
            txn: self.read_txn()?,
        })
    }
}

impl Snapshot<'_> {
    pub fn schema_version(&self) -> Result<Option<SchemaVersion>, StoreError> {
        Ok(meta::read_schema_version(&self.env.meta_db, &self.txn)?)
    }
}

impl RecordReader for Snapshot<'_> {
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
