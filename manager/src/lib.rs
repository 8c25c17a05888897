//! Lifecycle and access management for a persistent Strata store.
//!
//! [`StoreManager`] opens the store once, on a background thread, bringing
//! its schema to the registry's current version through the migration
//! pipeline (or discarding it when it cannot be used). Until that finishes,
//! every caller asking for a [`StoreView`] or running an exclusive task
//! waits on the [`AccessCoordinator`].

pub mod changes;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod view;

pub use changes::{Change, ChangeSet};
pub use config::StoreConfig;
pub use coordinator::{AccessCoordinator, Availability, ExclusiveGuard};
pub use error::{CommitError, ConfigError, LifecycleError};
pub use lifecycle::{
    destroy_store, open_shared, prepare_store, OpenOutcome, ResetReason, StoreLifecycleManager,
};
pub use manager::StoreManager;
pub use view::StoreView;
