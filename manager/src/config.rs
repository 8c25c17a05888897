//! Store configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use strata_schema::{SchemaVersion, VersionedRegistry};
use strata_store_lmdb::EnvOptions;
use strata_utils::LogFormat;

use crate::ConfigError;

/// Configuration for a [`StoreManager`](crate::StoreManager).
///
/// Can be loaded from a TOML file via [`StoreConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the store file.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// LMDB map size in bytes; the upper bound of the store file.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of named LMDB databases (one per entity, plus `meta`).
    #[serde(default = "default_max_dbs")]
    pub max_dbs: u32,

    /// Pin the schema at this version instead of the registry's latest.
    #[serde(default)]
    pub current_version: Option<u32>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_store_dir() -> PathBuf {
    PathBuf::from("./strata_data")
}

fn default_map_size() -> usize {
    EnvOptions::default().map_size
}

fn default_max_dbs() -> u32 {
    EnvOptions::default().max_dbs
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl StoreConfig {
    /// Configuration rooted at `store_dir`, everything else defaulted.
    pub fn in_dir(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("StoreConfig is always serializable to TOML")
    }

    /// Location of the store file for a store called `store_name`.
    pub fn store_path(&self, store_name: &str) -> PathBuf {
        self.store_dir.join(format!("{store_name}.mdb"))
    }

    pub fn env_options(&self) -> EnvOptions {
        EnvOptions {
            map_size: self.map_size,
            max_dbs: self.max_dbs,
        }
    }

    /// Apply the `current_version` pin, if any, to `registry`.
    pub fn pin(&self, registry: VersionedRegistry) -> Result<VersionedRegistry, ConfigError> {
        match self.current_version {
            Some(version) => Ok(registry.with_current_version(SchemaVersion::new(version))?),
            None => Ok(registry),
        }
    }

    /// Install the global tracing subscriber described by this config.
    pub fn init_logging(&self) -> bool {
        strata_utils::init_logging(self.log_format, &self.log_level)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            map_size: default_map_size(),
            max_dbs: default_max_dbs(),
            current_version: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}
