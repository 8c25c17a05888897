//! LMDB storage backend for the Strata store.
//!
//! A store is a single LMDB data file (opened with `NO_SUB_DIR`) holding one
//! `meta` database and one `entity.<Name>` database per entity of the model.
//! Schema changes are applied by [`MigrationPipeline`], one version at a time,
//! each step rebuilding the store into `<file>.tmp` and renaming it into place.

pub mod environment;
pub mod error;
pub mod integrity;
pub mod meta;
pub mod migration;
pub mod records;
pub mod write_batch;

pub use environment::{EnvOptions, LmdbEnvironment};
pub use error::{LmdbError, MigrationError};
pub use integrity::{check_integrity, inspect_store_file, IntegrityReport, StoreFile};
pub use meta::LmdbMetaStore;
pub use migration::{MigrationPipeline, MigrationReport, StepReport};
pub use records::Snapshot;
pub use write_batch::WriteBatch;
