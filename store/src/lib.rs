//! Abstract storage traits for the Strata store.
//!
//! Every storage backend implements these traits. The lifecycle manager and
//! the presentation layer depend only on them and on [`Record`].

pub mod error;
pub mod meta;
pub mod reader;
pub mod record;

pub use error::StoreError;
pub use meta::MetaStore;
pub use reader::RecordReader;
pub use record::Record;
