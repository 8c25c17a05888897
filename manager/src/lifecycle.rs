//! One-time opening of the store: inspect, migrate, verify, publish.
//!
//! Opening runs on a dedicated background thread. Anything wrong with the
//! file itself (no version stamp, a stamp newer than this build understands,
//! a failed migration step, failed verification) is answered by deleting the
//! store and starting empty. Only errors that a fresh start cannot fix are
//! fatal: a broken schema registry, or a store file that cannot be deleted.
//!
//! LMDB allows one environment per file per process. A store that is still
//! open here, because a view outlived the manager that opened it, is shared
//! with the next manager instead of being opened a second time.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use strata_schema::{ModelDescription, SchemaRegistry, SchemaVersion};
use strata_store_lmdb::environment::{lock_path, temp_path};
use strata_store_lmdb::{
    check_integrity, inspect_store_file, EnvOptions, LmdbEnvironment, LmdbError, MigrationError,
    MigrationPipeline, MigrationReport, StoreFile,
};
use strata_utils::format_duration;

use crate::coordinator::AccessCoordinator;
use crate::LifecycleError;

/// Why an existing store was thrown away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetReason {
    MissingVersion,
    NewerVersion {
        found: SchemaVersion,
        supported: SchemaVersion,
    },
    Corrupt(String),
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetReason::MissingVersion => f.write_str("store carries no schema version"),
            ResetReason::NewerVersion { found, supported } => {
                write!(f, "store is at {found}, newer than supported {supported}")
            }
            ResetReason::Corrupt(reason) => write!(f, "store is unusable: {reason}"),
        }
    }
}

impl From<MigrationError> for ResetReason {
    fn from(e: MigrationError) -> Self {
        match e {
            MigrationError::MissingVersion => ResetReason::MissingVersion,
            MigrationError::Incompatible { found, supported } => {
                ResetReason::NewerVersion { found, supported }
            }
            other => ResetReason::Corrupt(other.to_string()),
        }
    }
}

/// How the store came to be available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// No store existed; an empty one was created at the current version.
    Created,
    /// The store was already at the current version.
    Opened,
    /// The store was brought forward by one or more migration steps.
    Migrated(MigrationReport),
    /// The existing store was deleted and an empty one created.
    Reset(ResetReason),
    /// The store was still open in this process and is shared as is.
    Shared,
}

/// Bring the store at `path` to the registry's current version and open it.
///
/// This is the synchronous core of [`StoreLifecycleManager::open`], run
/// through [`open_shared`]; an `Err` here is what the background opener
/// treats as fatal.
pub fn prepare_store(
    path: &Path,
    options: &EnvOptions,
    registry: &dyn SchemaRegistry,
) -> Result<(LmdbEnvironment, OpenOutcome), LifecycleError> {
    let current = registry.current_version();
    let model = registry.model_for(current)?;

    match inspect_store_file(path) {
        StoreFile::Absent => {
            tracing::info!(path = %path.display(), version = %current, "creating new store");
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(LmdbError::from)?;
            }
            let env = LmdbEnvironment::create(path, options, &model)?;
            Ok((env, OpenOutcome::Created))
        }
        StoreFile::Invalid(reason) => reset(path, options, &model, ResetReason::Corrupt(reason)),
        StoreFile::Present => match open_existing(path, options, registry, &model) {
            Ok((env, report)) if report.is_noop() => Ok((env, OpenOutcome::Opened)),
            Ok((env, report)) => Ok((env, OpenOutcome::Migrated(report))),
            Err(e) => {
                if let Some(schema) = e.configuration() {
                    return Err(LifecycleError::Configuration(schema.clone()));
                }
                // A file still mapped by another handle must not be deleted.
                if e.is_in_use() {
                    return Err(LifecycleError::InUse {
                        path: path.to_path_buf(),
                    });
                }
                reset(path, options, &model, e.into())
            }
        },
    }
}

/// Stores opened by any manager in this process, by path.
fn live_stores() -> &'static Mutex<HashMap<PathBuf, Weak<LmdbEnvironment>>> {
    static LIVE: OnceLock<Mutex<HashMap<PathBuf, Weak<LmdbEnvironment>>>> = OnceLock::new();
    LIVE.get_or_init(Default::default)
}

/// [`prepare_store`], unless a handle on the same file is still alive in this
/// process with the current model, in which case that handle is shared.
///
/// Opens are serialized process-wide so two managers never migrate the same
/// file at once.
pub fn open_shared(
    path: &Path,
    options: &EnvOptions,
    registry: &dyn SchemaRegistry,
) -> Result<(Arc<LmdbEnvironment>, OpenOutcome), LifecycleError> {
    let mut live = live_stores().lock().unwrap_or_else(PoisonError::into_inner);
    live.retain(|_, env| env.strong_count() > 0);

    if let Some(env) = live.get(path).and_then(Weak::upgrade) {
        let model = registry.model_for(registry.current_version())?;
        if env.model() == &model {
            tracing::debug!(path = %path.display(), "store is already open, sharing it");
            return Ok((env, OpenOutcome::Shared));
        }
    }

    let (env, outcome) = prepare_store(path, options, registry)?;
    let env = Arc::new(env);
    live.insert(path.to_path_buf(), Arc::downgrade(&env));
    Ok((env, outcome))
}

/// Migrate the store at `path` to `model.version`, open it and verify it.
fn open_existing(
    path: &Path,
    options: &EnvOptions,
    registry: &dyn SchemaRegistry,
    model: &ModelDescription,
) -> Result<(LmdbEnvironment, MigrationReport), MigrationError> {
    let found = LmdbEnvironment::probe_version(path, options)?
        .ok_or(MigrationError::MissingVersion)?;
    tracing::debug!(path = %path.display(), %found, current = %model.version, "found existing store");

    let report = MigrationPipeline::new(registry, options.clone()).migrate(path, found, model.version)?;

    let env = LmdbEnvironment::open(path, options, model)?;
    match verify(&env, model.version) {
        Ok(()) => Ok((env, report)),
        Err(e) => {
            env.close()?;
            Err(e)
        }
    }
}

fn verify(env: &LmdbEnvironment, expected: SchemaVersion) -> Result<(), MigrationError> {
    let found = env.schema_version()?;
    if found != Some(expected) {
        return Err(MigrationError::VersionMismatch { expected, found });
    }
    let report = check_integrity(env)?;
    if !report.is_healthy() {
        return Err(MigrationError::Integrity(report.errors.join("; ")));
    }
    tracing::debug!(
        databases = report.databases_checked,
        records = report.total_entries,
        "store passed integrity check"
    );
    Ok(())
}

fn reset(
    path: &Path,
    options: &EnvOptions,
    model: &ModelDescription,
    reason: ResetReason,
) -> Result<(LmdbEnvironment, OpenOutcome), LifecycleError> {
    tracing::warn!(path = %path.display(), %reason, "discarding store and starting fresh");
    destroy_store(path)?;
    let env = LmdbEnvironment::create(path, options, model)?;
    Ok((env, OpenOutcome::Reset(reason)))
}

/// Delete the store file together with its lock file and any migration
/// leftovers. Files that do not exist are skipped.
pub fn destroy_store(path: &Path) -> Result<(), LifecycleError> {
    let tmp = temp_path(path);
    for file in [lock_path(&tmp), tmp.clone(), lock_path(path), path.to_path_buf()] {
        match fs::remove_file(&file) {
            Ok(()) => tracing::debug!(path = %file.display(), "removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(LifecycleError::Destroy { path: file, source }),
        }
    }
    Ok(())
}

/// Owns the store location and drives its one-time asynchronous opening.
pub struct StoreLifecycleManager {
    path: PathBuf,
    options: EnvOptions,
    registry: Arc<dyn SchemaRegistry>,
    coordinator: Arc<AccessCoordinator<LmdbEnvironment>>,
    outcome: Arc<OnceLock<OpenOutcome>>,
    opener: Mutex<Option<JoinHandle<()>>>,
}

impl StoreLifecycleManager {
    pub fn new(
        path: PathBuf,
        options: EnvOptions,
        registry: Arc<dyn SchemaRegistry>,
        coordinator: Arc<AccessCoordinator<LmdbEnvironment>>,
    ) -> Self {
        Self {
            path,
            options,
            registry,
            coordinator,
            outcome: Arc::new(OnceLock::new()),
            opener: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the store was opened, once it is available.
    pub fn outcome(&self) -> Option<&OpenOutcome> {
        self.outcome.get()
    }

    /// Start opening the store in the background. Never blocks.
    ///
    /// Only the first call does anything; later calls return `false`.
    pub fn open(&self) -> bool {
        if !self.coordinator.begin_loading() {
            tracing::debug!(path = %self.path.display(), "store open already requested");
            return false;
        }

        let path = self.path.clone();
        let options = self.options.clone();
        let registry = Arc::clone(&self.registry);
        let coordinator = Arc::clone(&self.coordinator);
        let outcome = Arc::clone(&self.outcome);

        let spawned = thread::Builder::new()
            .name("strata-open".to_string())
            .spawn(move || {
                let started = Instant::now();
                match open_shared(&path, &options, registry.as_ref()) {
                    Ok((env, result)) => {
                        tracing::info!(
                            path = %path.display(),
                            version = %registry.current_version(),
                            outcome = ?result,
                            elapsed = %format_duration(started.elapsed()),
                            "store available"
                        );
                        let _ = outcome.set(result);
                        coordinator.publish(env);
                    }
                    Err(e) => fatal(&e),
                }
            });
        match spawned {
            Ok(handle) => {
                *self.opener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => fatal(&LifecycleError::Spawn(e)),
        }
        true
    }
}

impl Drop for StoreLifecycleManager {
    // Wait for the opener so that its handle on the store is gone once the
    // manager is.
    fn drop(&mut self) {
        let opener = self
            .opener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = opener {
            let _ = handle.join();
        }
    }
}

fn fatal(error: &LifecycleError) -> ! {
    tracing::error!(%error, "store cannot be opened");
    std::process::abort()
}
