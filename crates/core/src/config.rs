//! Immutable per-cache configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;

/// Configuration bound to a cache name at creation time.
///
/// Read-only to callers; built once via [`CacheConfiguration::builder`] and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfiguration {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_time_to_live_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_max_idle_ms: Option<u64>,
}

impl CacheConfiguration {
    pub fn builder(name: impl Into<String>) -> CacheConfigurationBuilder {
        CacheConfigurationBuilder { name: name.into(), default_time_to_live: None, default_max_idle: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_time_to_live(&self) -> Option<Duration> {
        self.default_time_to_live_ms.map(Duration::from_millis)
    }

    pub fn default_max_idle(&self) -> Option<Duration> {
        self.default_max_idle_ms.map(Duration::from_millis)
    }
}

/// Builder producing an immutable [`CacheConfiguration`].
#[derive(Debug, Clone)]
pub struct CacheConfigurationBuilder {
    name: String,
    default_time_to_live: Option<Duration>,
    default_max_idle: Option<Duration>,
}

impl CacheConfigurationBuilder {
    pub fn default_time_to_live(mut self, ttl: Duration) -> Self {
        self.default_time_to_live = Some(ttl);
        self
    }

    pub fn default_max_idle(mut self, max_idle: Duration) -> Self {
        self.default_max_idle = Some(max_idle);
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<CacheConfiguration, Error> {
        if self.name.is_empty() {
            return Err(Error::Config("cache name must not be empty".into()));
        }
        Ok(CacheConfiguration {
            name: self.name,
            default_time_to_live_ms: self.default_time_to_live.map(|d| d.as_millis() as u64),
            default_max_idle_ms: self.default_max_idle.map(|d| d.as_millis() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_minimal() {
        let config = CacheConfiguration::builder("orders").build().unwrap();
        assert_eq!(config.name(), "orders");
        assert_eq!(config.default_time_to_live(), None);
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        let result = CacheConfiguration::builder("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_ttl() {
        let config = CacheConfiguration::builder("orders")
            .default_time_to_live(Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(config.default_time_to_live(), Some(Duration::from_secs(60)));
    }
}
