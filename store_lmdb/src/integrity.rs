//! Store integrity checks.
//!
//! Run after opening, before the store is handed to callers, to detect
//! corruption while it can still be answered with a fresh start.

use std::path::Path;

use crate::environment::{entity_db_name, LmdbEnvironment};
use crate::LmdbError;

/// Summary of an integrity check run.
#[derive(Debug)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check that every entity database of the model is present and that each
/// record in it decodes.
///
/// Read failures are recorded in the report rather than causing a hard error.
pub fn check_integrity(env: &LmdbEnvironment) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport {
        databases_checked: 0,
        total_entries: 0,
        errors: Vec::new(),
    };

    let rtxn = env.read_txn()?;

    for entity in env.model().entity_names() {
        let Some(db) = env.entity_db_if_present(entity) else {
            report
                .errors
                .push(format!("database '{}' is missing", entity_db_name(entity)));
            continue;
        };
        report.databases_checked += 1;

        let iter = match db.iter(&rtxn) {
            Ok(iter) => iter,
            Err(e) => {
                report
                    .errors
                    .push(format!("failed to read database '{}': {}", entity, e));
                continue;
            }
        };
        for result in iter {
            report.total_entries += 1;
            let decoded = result
                .map_err(LmdbError::from)
                .and_then(|(_, bytes)| {
                    bincode::deserialize::<strata_store::Record>(bytes).map_err(LmdbError::from)
                });
            match decoded {
                Ok(record) if record.entity == entity => {}
                Ok(record) => report.errors.push(format!(
                    "record #{} in '{}' belongs to '{}'",
                    record.id, entity, record.entity
                )),
                Err(e) => report
                    .errors
                    .push(format!("undecodable record in '{}': {}", entity, e)),
            }
        }
    }

    Ok(report)
}

/// What sits at the configured store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFile {
    /// Nothing: first run.
    Absent,
    /// A regular file that may be a store.
    Present,
    /// Something that can never be a store, e.g. a directory.
    Invalid(String),
}

/// Look at the store location before opening it.
pub fn inspect_store_file(path: &Path) -> StoreFile {
    match path.symlink_metadata() {
        Err(_) => StoreFile::Absent,
        Ok(meta) if meta.is_file() => StoreFile::Present,
        Ok(_) => StoreFile::Invalid(format!("{} is not a regular file", path.display())),
    }
}
