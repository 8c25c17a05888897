//! LMDB environment setup.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};

use strata_schema::{ModelDescription, SchemaVersion};

use crate::meta::{self, LmdbMetaStore};
use crate::LmdbError;

/// Name of the bookkeeping database.
pub const META_DB: &str = "meta";

const ENTITY_DB_PREFIX: &str = "entity.";

/// How long a close waits for other handles on the same file to go away.
const RELEASE_TIMEOUT: Duration = Duration::from_millis(200);

/// Name of the LMDB database holding the records of `entity`.
pub fn entity_db_name(entity: &str) -> String {
    format!("{ENTITY_DB_PREFIX}{entity}")
}

/// `<file>-lock`, the reader table LMDB keeps next to a `NO_SUB_DIR` store.
pub fn lock_path(store: &Path) -> PathBuf {
    with_suffix(store, "-lock")
}

/// `<file>.tmp`, the destination of an in-flight migration step.
pub fn temp_path(store: &Path) -> PathBuf {
    with_suffix(store, ".tmp")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Sizing parameters for every environment the backend opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvOptions {
    pub map_size: usize,
    pub max_dbs: u32,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            map_size: 64 * 1024 * 1024,
            max_dbs: 32,
        }
    }
}

/// Wraps the LMDB environment and the database handles of one model.
pub struct LmdbEnvironment {
    env: Env,
    path: PathBuf,
    model: ModelDescription,
    pub(crate) meta_db: Database<Bytes, Bytes>,
    pub(crate) entity_dbs: BTreeMap<String, Database<Bytes, Bytes>>,
}

impl LmdbEnvironment {
    /// Open or create the store at `path` for `model`, creating every missing
    /// database.
    pub fn open(path: &Path, options: &EnvOptions, model: &ModelDescription) -> Result<Self, LmdbError> {
        Self::open_with(path, options, model, true)
    }

    /// Open an existing store without creating anything.
    ///
    /// Entities of `model` that have no database on disk are left out and
    /// read as empty.
    pub fn open_existing(
        path: &Path,
        options: &EnvOptions,
        model: &ModelDescription,
    ) -> Result<Self, LmdbError> {
        Self::open_with(path, options, model, false)
    }

    /// Create a fresh store at `path` stamped with `model.version`.
    pub fn create(path: &Path, options: &EnvOptions, model: &ModelDescription) -> Result<Self, LmdbError> {
        let store = Self::open(path, options, model)?;
        {
            let mut wtxn = store.env.write_txn()?;
            meta::write_schema_version(&store.meta_db, &mut wtxn, model.version)?;
            wtxn.commit()?;
        }
        tracing::debug!(path = %path.display(), version = %model.version, "created store");
        Ok(store)
    }

    /// Read the version stamp of the store at `path` without keeping it open.
    ///
    /// A store without a `meta` database or without a stamp reports `None`.
    /// Fails with [`LmdbError::InUse`] when another handle in this process
    /// still has the file open.
    pub fn probe_version(path: &Path, options: &EnvOptions) -> Result<Option<SchemaVersion>, LmdbError> {
        let env = open_env(path, options)?;
        let version = {
            let rtxn = env.read_txn()?;
            match env.open_database::<Bytes, Bytes>(&rtxn, Some(META_DB))? {
                Some(db) => meta::read_schema_version(&db, &rtxn)?,
                None => None,
            }
        };
        release(env, path)?;
        Ok(version)
    }

    fn open_with(
        path: &Path,
        options: &EnvOptions,
        model: &ModelDescription,
        create: bool,
    ) -> Result<Self, LmdbError> {
        let env = open_env(path, options)?;

        let mut wtxn = env.write_txn()?;
        let meta_db = if create {
            env.create_database::<Bytes, Bytes>(&mut wtxn, Some(META_DB))?
        } else {
            env.open_database::<Bytes, Bytes>(&wtxn, Some(META_DB))?
                .ok_or_else(|| LmdbError::MissingDatabase(META_DB.to_string()))?
        };

        let mut entity_dbs = BTreeMap::new();
        for entity in model.entity_names() {
            let name = entity_db_name(entity);
            let db = if create {
                Some(env.create_database::<Bytes, Bytes>(&mut wtxn, Some(&name))?)
            } else {
                env.open_database::<Bytes, Bytes>(&wtxn, Some(&name))?
            };
            if let Some(db) = db {
                entity_dbs.insert(entity.to_string(), db);
            }
        }
        wtxn.commit()?;

        Ok(Self {
            env,
            path: path.to_path_buf(),
            model: model.clone(),
            meta_db,
            entity_dbs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model(&self) -> &ModelDescription {
        &self.model
    }

    pub fn read_txn(&self) -> Result<RoTxn<'_>, LmdbError> {
        Ok(self.env.read_txn()?)
    }

    pub fn write_txn(&self) -> Result<RwTxn<'_>, LmdbError> {
        Ok(self.env.write_txn()?)
    }

    /// The version stamped into this store.
    pub fn schema_version(&self) -> Result<Option<SchemaVersion>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        meta::read_schema_version(&self.meta_db, &rtxn)
    }

    pub fn meta_store(&self) -> LmdbMetaStore {
        LmdbMetaStore {
            env: self.env.clone(),
            meta_db: self.meta_db,
        }
    }

    /// Database handle of `entity`.
    pub(crate) fn entity_db(&self, entity: &str) -> Result<Database<Bytes, Bytes>, LmdbError> {
        self.entity_dbs.get(entity).copied().ok_or_else(|| {
            if self.model.entity(entity).is_some() {
                LmdbError::MissingDatabase(entity_db_name(entity))
            } else {
                LmdbError::Schema(strata_schema::SchemaError::UnknownEntity(entity.to_string()))
            }
        })
    }

    /// Database handle of `entity`, or `None` when the store has none.
    pub(crate) fn entity_db_if_present(&self, entity: &str) -> Option<Database<Bytes, Bytes>> {
        self.entity_dbs.get(entity).copied()
    }

    /// Close the environment so the file can be renamed or deleted.
    ///
    /// LMDB keeps one environment per file per process. If another handle
    /// still holds it, the file stays open until that handle is dropped and
    /// this returns [`LmdbError::InUse`] after a short wait instead of
    /// blocking. The path cannot be reopened until then.
    pub fn close(self) -> Result<(), LmdbError> {
        release(self.env, &self.path)
    }
}

fn open_env(path: &Path, options: &EnvOptions) -> Result<Env, LmdbError> {
    let mut builder = EnvOpenOptions::new();
    builder.map_size(options.map_size).max_dbs(options.max_dbs);
    // SAFETY: the store file is only ever opened through this backend, which
    // keeps one environment per path per process and never opens it with
    // different flags.
    let env = unsafe {
        builder.flags(EnvFlags::NO_SUB_DIR);
        builder.open(path)?
    };
    Ok(env)
}

fn release(env: Env, path: &Path) -> Result<(), LmdbError> {
    if env.prepare_for_closing().wait_timeout(RELEASE_TIMEOUT) {
        Ok(())
    } else {
        tracing::warn!(path = %path.display(), "store is still held by another handle");
        Err(LmdbError::InUse(path.to_path_buf()))
    }
}
