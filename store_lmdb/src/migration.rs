//! Database schema migration engine.
//!
//! Reads the schema version stamped in the store and replays the registry's
//! migration steps one version at a time. Every step rebuilds the store into
//! `<file>.tmp` and renames it over the original, so the canonical file is
//! always either the complete old store or the complete new one.

use std::fs;
use std::io;
use std::path::Path;

use strata_schema::{MigrationStep, SchemaRegistry, SchemaVersion};

use crate::environment::{lock_path, temp_path, EnvOptions, LmdbEnvironment};
use crate::records::{fetch_records, put_record};
use crate::{meta, LmdbError, MigrationError};

/// Outcome of one `n -> n + 1` step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub records: u64,
}

/// Outcome of a full `migrate` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub steps: Vec<StepReport>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs the registry's migration chain against a store file.
pub struct MigrationPipeline<'r> {
    registry: &'r dyn SchemaRegistry,
    options: EnvOptions,
}

impl<'r> MigrationPipeline<'r> {
    pub fn new(registry: &'r dyn SchemaRegistry, options: EnvOptions) -> Self {
        Self { registry, options }
    }

    /// Bring the store at `store` from version `from` to version `to`.
    ///
    /// - `from == to` is a no-op.
    /// - `from > to` means the store was written by a newer build and is
    ///   reported as [`MigrationError::Incompatible`] without touching it.
    /// - Otherwise every step in `[from, to)` runs in order; the first failure
    ///   stops the chain with the store left at the last completed version.
    pub fn migrate(
        &self,
        store: &Path,
        from: SchemaVersion,
        to: SchemaVersion,
    ) -> Result<MigrationReport, MigrationError> {
        if from > to {
            return Err(MigrationError::Incompatible {
                found: from,
                supported: to,
            });
        }

        let mut report = MigrationReport {
            from,
            to,
            steps: Vec::new(),
        };
        if from == to {
            tracing::info!(version = %from, "database schema is up to date");
            return Ok(report);
        }

        for version in from.steps_to(to) {
            let step = self.registry.migration_step(version)?;
            tracing::info!(from = %version, to = %step.destination_version(), "running migration");
            let records = run_step(store, &step, &self.options)?;
            report.steps.push(StepReport {
                from: version,
                to: step.destination_version(),
                records,
            });
        }

        tracing::info!(version = %to, "migration complete");
        Ok(report)
    }
}

/// Apply one step: build `<store>.tmp`, then swap it in.
fn run_step(store: &Path, step: &MigrationStep, options: &EnvOptions) -> Result<u64, MigrationError> {
    let tmp = temp_path(store);
    discard(&tmp)?;

    let copied = match build_destination(store, &tmp, step, options) {
        Ok(copied) => copied,
        Err(e) => {
            tracing::warn!(from = %step.source_version, error = %e, "migration step failed");
            discard(&tmp)?;
            return Err(e);
        }
    };

    swap_into_place(&tmp, store)?;
    Ok(copied)
}

/// Rename `tmp` over `store`. The step counts as done once the rename lands,
/// so a leftover lock file is only logged.
fn swap_into_place(tmp: &Path, store: &Path) -> Result<(), MigrationError> {
    if let Err(source) = fs::rename(tmp, store) {
        discard(tmp)?;
        return Err(MigrationError::Swap {
            path: tmp.to_path_buf(),
            source,
        });
    }
    let tmp_lock = lock_path(tmp);
    if let Err(e) = remove_if_exists(&tmp_lock) {
        tracing::warn!(path = %tmp_lock.display(), error = %e, "failed to remove migration lock file");
    }
    Ok(())
}

/// Write the migrated copy of `store` into `tmp`. Both environments are
/// closed before this returns, whatever the outcome.
fn build_destination(
    store: &Path,
    tmp: &Path,
    step: &MigrationStep,
    options: &EnvOptions,
) -> Result<u64, MigrationError> {
    let source = LmdbEnvironment::open_existing(store, options, &step.source_model)?;
    let found = match source.schema_version() {
        Ok(found) => found,
        Err(e) => {
            let _ = source.close();
            return Err(e.into());
        }
    };
    if found != Some(step.source_version) {
        let _ = source.close();
        return Err(MigrationError::VersionMismatch {
            expected: step.source_version,
            found,
        });
    }

    let destination = match LmdbEnvironment::create(tmp, options, &step.destination_model) {
        Ok(destination) => destination,
        Err(e) => {
            let _ = source.close();
            return Err(e.into());
        }
    };

    let copied = copy_records(&source, &destination, step);
    let source_closed = source.close();
    let destination_closed = destination.close();
    let copied = copied?;
    source_closed?;
    destination_closed?;
    Ok(copied)
}

fn copy_records(
    source: &LmdbEnvironment,
    destination: &LmdbEnvironment,
    step: &MigrationStep,
) -> Result<u64, MigrationError> {
    let rtxn = source.read_txn()?;
    let mut wtxn = destination.write_txn()?;
    let mut copied = 0;

    for mapping in &step.mapping {
        let Some(source_db) = source.entity_db_if_present(&mapping.source) else {
            continue;
        };
        let destination_db = destination.entity_db(&mapping.destination)?;
        for record in fetch_records(&source_db, &rtxn)? {
            put_record(&destination_db, &mut wtxn, &record.migrate(mapping))?;
            copied += 1;
        }
        let sequence = meta::read_sequence(&source.meta_db, &rtxn, &mapping.source)?;
        meta::write_sequence(&destination.meta_db, &mut wtxn, &mapping.destination, sequence)?;
    }

    wtxn.commit().map_err(LmdbError::from)?;
    Ok(copied)
}

/// Remove a temporary store and its lock file.
fn discard(tmp: &Path) -> Result<(), MigrationError> {
    remove_if_exists(tmp).map_err(LmdbError::from)?;
    remove_if_exists(&lock_path(tmp)).map_err(LmdbError::from)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
