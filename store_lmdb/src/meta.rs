//! LMDB implementation of MetaStore.

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};

use strata_schema::SchemaVersion;
use strata_store::meta::MetaStore;
use strata_store::StoreError;

use crate::LmdbError;

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

fn sequence_key(entity: &str) -> Vec<u8> {
    format!("seq.{entity}").into_bytes()
}

pub(crate) fn read_schema_version(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn<'_>,
) -> Result<Option<SchemaVersion>, LmdbError> {
    match db.get(txn, SCHEMA_VERSION_KEY)? {
        Some(bytes) => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                LmdbError::Serialization("schema_version has unexpected byte length".to_string())
            })?;
            Ok(Some(SchemaVersion::from_le_bytes(arr)))
        }
        None => Ok(None),
    }
}

pub(crate) fn write_schema_version(
    db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn<'_>,
    version: SchemaVersion,
) -> Result<(), LmdbError> {
    db.put(wtxn, SCHEMA_VERSION_KEY, &version.to_le_bytes())?;
    Ok(())
}

/// Last id handed out for `entity`, `0` when none was.
pub(crate) fn read_sequence(
    db: &Database<Bytes, Bytes>,
    txn: &RoTxn<'_>,
    entity: &str,
) -> Result<u64, LmdbError> {
    match db.get(txn, sequence_key(entity).as_slice())? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                LmdbError::Serialization(format!("sequence of {entity} has unexpected byte length"))
            })?;
            Ok(u64::from_le_bytes(arr))
        }
        None => Ok(0),
    }
}

pub(crate) fn write_sequence(
    db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn<'_>,
    entity: &str,
    value: u64,
) -> Result<(), LmdbError> {
    db.put(wtxn, sequence_key(entity).as_slice(), &value.to_le_bytes())?;
    Ok(())
}

/// Auto-committing metadata access outside of a write batch.
pub struct LmdbMetaStore {
    pub(crate) env: Env,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl MetaStore for LmdbMetaStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.meta_db
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .meta_db
            .get(&rtxn, key.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(val.map(<[u8]>::to_vec))
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.meta_db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_schema_version(&self) -> Result<Option<SchemaVersion>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(read_schema_version(&self.meta_db, &rtxn)?)
    }

    fn set_schema_version(&self, version: SchemaVersion) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        write_schema_version(&self.meta_db, &mut wtxn, version)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
