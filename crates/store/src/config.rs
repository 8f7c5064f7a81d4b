//! Store configuration with layered loading.
//!
//! Loading precedence (highest wins):
//! 1. Environment variables (STRATA_STORE_*)
//! 2. TOML config file (if STRATA_STORE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded value is immutable; the [`crate::TableSchema`] built from it
//! is fixed before the store starts and cannot change afterwards.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Default lock stripe count, matching the observed store defaults.
pub const DEFAULT_CONCURRENCY_LEVEL: usize = 2048;
/// Default lock acquisition timeout in milliseconds.
pub const DEFAULT_LOCK_ACQUISITION_TIMEOUT_MS: u64 = 60_000;

/// Configuration for one cache's persistent store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Prefix for the backing table name; "_<cache name>" is appended to
    /// keep table names unique per cache.
    #[serde(default = "default_table_name_prefix")]
    pub table_name_prefix: String,

    /// Name of the column holding the serialized key. Mandatory.
    #[serde(default = "default_id_column_name")]
    pub id_column_name: String,

    /// SQL type of the id column. Mandatory.
    #[serde(default = "default_id_column_type")]
    pub id_column_type: String,

    /// Name of the column holding the serialized entry. Mandatory.
    #[serde(default = "default_data_column_name")]
    pub data_column_name: String,

    /// SQL type of the data column, BLOB-like. Mandatory.
    #[serde(default = "default_data_column_type")]
    pub data_column_type: String,

    /// Name of the column holding the expiry timestamp. Mandatory.
    #[serde(default = "default_timestamp_column_name")]
    pub timestamp_column_name: String,

    /// SQL type of the timestamp column. Mandatory.
    #[serde(default = "default_timestamp_column_type")]
    pub timestamp_column_type: String,

    /// Issue CREATE TABLE on store start.
    #[serde(default = "default_true")]
    pub create_table_on_start: bool,

    /// Issue DROP TABLE on store stop.
    #[serde(default)]
    pub drop_table_on_exit: bool,

    /// Rows fetched per page during bulk loads.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Writes issued per chunk during bulk stores.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of key lock stripes.
    #[serde(default = "default_concurrency_level")]
    pub lock_concurrency_level: usize,

    /// Bounded wait for a key lock stripe, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_acquisition_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./strata-store.sqlite")
}

fn default_table_name_prefix() -> String {
    "strata".into()
}

fn default_id_column_name() -> String {
    "id".into()
}

fn default_id_column_type() -> String {
    "VARCHAR(255)".into()
}

fn default_data_column_name() -> String {
    "data".into()
}

fn default_data_column_type() -> String {
    "BLOB".into()
}

fn default_timestamp_column_name() -> String {
    "ts".into()
}

fn default_timestamp_column_type() -> String {
    "BIGINT".into()
}

fn default_true() -> bool {
    true
}

fn default_fetch_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    128
}

fn default_concurrency_level() -> usize {
    DEFAULT_CONCURRENCY_LEVEL
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_ACQUISITION_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            table_name_prefix: default_table_name_prefix(),
            id_column_name: default_id_column_name(),
            id_column_type: default_id_column_type(),
            data_column_name: default_data_column_name(),
            data_column_type: default_data_column_type(),
            timestamp_column_name: default_timestamp_column_name(),
            timestamp_column_type: default_timestamp_column_type(),
            create_table_on_start: true,
            drop_table_on_exit: false,
            fetch_size: default_fetch_size(),
            batch_size: default_batch_size(),
            lock_concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            lock_acquisition_timeout_ms: DEFAULT_LOCK_ACQUISITION_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if a source cannot be read or the loaded
    /// values fail validation.
    pub fn load() -> Result<Self, StoreError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STRATA_STORE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STRATA_STORE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment
            .extract()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Lock acquisition timeout as a `Duration`.
    pub fn lock_acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_acquisition_timeout_ms)
    }

    /// Validate configuration values after loading.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mandatory = [
            ("table_name_prefix", &self.table_name_prefix),
            ("id_column_name", &self.id_column_name),
            ("id_column_type", &self.id_column_type),
            ("data_column_name", &self.data_column_name),
            ("data_column_type", &self.data_column_type),
            ("timestamp_column_name", &self.timestamp_column_name),
            ("timestamp_column_type", &self.timestamp_column_type),
        ];
        for (field, value) in mandatory {
            if value.trim().is_empty() {
                return Err(StoreError::Config(format!("{field} must not be empty")));
            }
        }

        if self.fetch_size == 0 {
            return Err(StoreError::Config("fetch_size must be greater than 0".into()));
        }
        if self.batch_size == 0 {
            return Err(StoreError::Config("batch_size must be greater than 0".into()));
        }
        if self.lock_concurrency_level == 0 {
            return Err(StoreError::Config("lock_concurrency_level must be greater than 0".into()));
        }
        if self.lock_acquisition_timeout_ms == 0 {
            return Err(StoreError::Config(
                "lock_acquisition_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.table_name_prefix, "strata");
        assert_eq!(config.fetch_size, 100);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.lock_concurrency_level, 2048);
        assert_eq!(config.lock_acquisition_timeout_ms, 60_000);
        assert!(config.create_table_on_start);
        assert!(!config.drop_table_on_exit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_column_name() {
        let config = StoreConfig { id_column_name: String::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_validate_zero_fetch_size() {
        let config = StoreConfig { fetch_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_validate_zero_stripes() {
        let config = StoreConfig { lock_concurrency_level: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_lock_timeout_duration() {
        let config = StoreConfig { lock_acquisition_timeout_ms: 250, ..Default::default() };
        assert_eq!(config.lock_acquisition_timeout(), Duration::from_millis(250));
    }
}
