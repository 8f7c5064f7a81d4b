//! Physical table layout for one cache.
//!
//! Purely descriptive: column names, SQL types, and the table name derived
//! from the configured prefix and the cache name. Built once from a
//! validated [`StoreConfig`] before the store starts; immutable afterwards.

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Physical layout of the table backing one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table_name: String,
    id_column_name: String,
    id_column_type: String,
    data_column_name: String,
    data_column_type: String,
    timestamp_column_name: String,
    timestamp_column_type: String,
}

impl TableSchema {
    /// Derive the schema for `cache_name` from a validated configuration.
    ///
    /// The table name is `<prefix>_<cache name>` with any character outside
    /// `[A-Za-z0-9_]` replaced by `_`, so every cache maps to a distinct,
    /// safe SQL identifier.
    pub fn from_config(config: &StoreConfig, cache_name: &str) -> Result<Self, StoreError> {
        config.validate()?;
        if cache_name.trim().is_empty() {
            return Err(StoreError::InvalidSchema("cache name must not be empty".into()));
        }

        let table_name = sanitize_identifier(&format!("{}_{}", config.table_name_prefix, cache_name));

        Ok(Self {
            table_name,
            id_column_name: sanitize_identifier(&config.id_column_name),
            id_column_type: config.id_column_type.clone(),
            data_column_name: sanitize_identifier(&config.data_column_name),
            data_column_type: config.data_column_type.clone(),
            timestamp_column_name: sanitize_identifier(&config.timestamp_column_name),
            timestamp_column_type: config.timestamp_column_type.clone(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn id_column_name(&self) -> &str {
        &self.id_column_name
    }

    pub fn id_column_type(&self) -> &str {
        &self.id_column_type
    }

    pub fn data_column_name(&self) -> &str {
        &self.data_column_name
    }

    pub fn data_column_type(&self) -> &str {
        &self.data_column_type
    }

    pub fn timestamp_column_name(&self) -> &str {
        &self.timestamp_column_name
    }

    pub fn timestamp_column_type(&self) -> &str {
        &self.timestamp_column_type
    }
}

fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
