//! The consumer-facing store manager.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strata_schema::SchemaRegistry;
use strata_store::StoreError;
use strata_store_lmdb::{LmdbEnvironment, WriteBatch};

use crate::changes::{Change, ChangeSet};
use crate::coordinator::{AccessCoordinator, Availability};
use crate::lifecycle::{OpenOutcome, StoreLifecycleManager};
use crate::view::StoreView;
use crate::{CommitError, StoreConfig};

/// Owns one persistent store: opens it in the background, migrating it first,
/// then hands out read views and runs exclusive write tasks against it.
///
/// Calls that need the store block until opening has finished. Calling them
/// before [`StoreManager::open`] blocks forever.
///
/// Views may outlive the manager. A later manager on the same path shares the
/// store they still hold when its schema matches; when it does not, opening
/// fails with [`LifecycleError::InUse`](crate::LifecycleError::InUse), which
/// is fatal. Drop old views before reopening under a newer schema.
pub struct StoreManager {
    config: StoreConfig,
    lifecycle: StoreLifecycleManager,
    coordinator: Arc<AccessCoordinator<LmdbEnvironment>>,
    pending: Mutex<ChangeSet>,
}

impl StoreManager {
    pub fn new(config: StoreConfig, registry: Arc<dyn SchemaRegistry>) -> Self {
        let coordinator = Arc::new(AccessCoordinator::new());
        let lifecycle = StoreLifecycleManager::new(
            config.store_path(registry.store_name()),
            config.env_options(),
            registry,
            Arc::clone(&coordinator),
        );
        Self {
            config,
            lifecycle,
            coordinator,
            pending: Mutex::new(ChangeSet::new()),
        }
    }

    /// Construct and immediately start opening.
    pub fn start(config: StoreConfig, registry: Arc<dyn SchemaRegistry>) -> Self {
        let manager = Self::new(config, registry);
        manager.open();
        manager
    }

    /// Begin opening the store on a background thread. Idempotent: returns
    /// `false` when opening was already requested.
    pub fn open(&self) -> bool {
        self.lifecycle.open()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store_path(&self) -> &Path {
        self.lifecycle.path()
    }

    pub fn availability(&self) -> Availability {
        self.coordinator.availability()
    }

    pub fn open_outcome(&self) -> Option<&OpenOutcome> {
        self.lifecycle.outcome()
    }

    /// Block until the store is available and return a read view of it.
    pub fn read_view(&self) -> StoreView {
        StoreView::new(self.coordinator.wait_available())
    }

    /// Run `task` with sole mutation rights, in one write transaction.
    ///
    /// Blocks until the store is available and no other exclusive task runs.
    /// The transaction commits when `task` returns `Ok` and is rolled back
    /// otherwise. Must not be called from inside another exclusive task.
    pub fn exclusive_task<T, F>(&self, task: F) -> Result<T, CommitError>
    where
        F: FnOnce(&mut WriteBatch<'_>) -> Result<T, StoreError>,
    {
        run_exclusive(&self.coordinator, task)
    }

    /// [`exclusive_task`](Self::exclusive_task) on the tokio blocking pool.
    pub async fn spawn_exclusive<T, F>(&self, task: F) -> Result<T, CommitError>
    where
        F: FnOnce(&mut WriteBatch<'_>) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || run_exclusive(&coordinator, task))
            .await
            .map_err(|e| CommitError::Join(e.to_string()))?
    }

    /// [`read_view`](Self::read_view) without blocking the async runtime.
    pub async fn read_view_async(&self) -> Result<StoreView, tokio::task::JoinError> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || StoreView::new(coordinator.wait_available())).await
    }

    /// Stage an edit for the next [`save_if_dirty`](Self::save_if_dirty).
    /// Never blocks on the store.
    pub fn stage(&self, change: Change) {
        self.pending().push(change);
    }

    pub fn has_changes(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Commit staged edits, if there are any, in one exclusive task.
    ///
    /// Returns `Ok(false)` without touching the store when nothing is staged.
    /// On failure the edits stay staged.
    pub fn save_if_dirty(&self) -> Result<bool, CommitError> {
        let staged = self.pending().take();
        if staged.is_empty() {
            return Ok(false);
        }
        match run_exclusive(&self.coordinator, |batch| staged.apply(batch)) {
            Ok(applied) => {
                tracing::debug!(applied, "saved staged changes");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "saving staged changes failed");
                self.pending().restore(staged);
                Err(e)
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, ChangeSet> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_exclusive<T, F>(
    coordinator: &AccessCoordinator<LmdbEnvironment>,
    task: F,
) -> Result<T, CommitError>
where
    F: FnOnce(&mut WriteBatch<'_>) -> Result<T, StoreError>,
{
    let guard = coordinator.acquire_exclusive();
    let mut batch = guard
        .store()
        .write_batch()
        .map_err(|e| CommitError::Persist(e.into()))?;
    let value = task(&mut batch).map_err(CommitError::Aborted)?;
    batch.commit().map_err(CommitError::Persist)?;
    Ok(value)
}
