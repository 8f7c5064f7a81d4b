//! Versioned cache entry model.
//!
//! A `CacheEntry` is an immutable snapshot of a key's state: value, version
//! and metadata. Every successful write produces a new snapshot with a
//! strictly newer version; nothing here is ever mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque, comparable token identifying one generation of a key's value.
///
/// Used exclusively for optimistic concurrency (compare-and-swap). Callers
/// must never interpret it as a timestamp; backends only guarantee that a
/// successful mutation yields a strictly newer version and that a version is
/// never reused for two different values of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheEntryVersion(u64);

impl CacheEntryVersion {
    /// The version assigned to the first write of a key.
    pub const INITIAL: CacheEntryVersion = CacheEntryVersion(1);

    pub fn new(value: u64) -> Self {
        CacheEntryVersion(value)
    }

    /// The next version in this key's sequence.
    pub fn next(self) -> Self {
        CacheEntryVersion(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Expiration and modification metadata attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Lifespan from last modification; `None` means immortal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live_ms: Option<u64>,
    /// Maximum idle time between touches; `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_ms: Option<u64>,
}

impl CacheEntryMetadata {
    /// Metadata for a brand new entry written at `now`.
    pub fn new(now: DateTime<Utc>, time_to_live: Option<Duration>, max_idle: Option<Duration>) -> Self {
        Self {
            created_at: now,
            last_modified: now,
            time_to_live_ms: time_to_live.map(|d| d.as_millis() as u64),
            max_idle_ms: max_idle.map(|d| d.as_millis() as u64),
        }
    }

    /// Metadata for an overwrite of an existing entry: creation time is
    /// carried over, last-modified advances.
    pub fn updated(&self, now: DateTime<Utc>, time_to_live: Option<Duration>, max_idle: Option<Duration>) -> Self {
        Self {
            created_at: self.created_at,
            last_modified: now,
            time_to_live_ms: time_to_live.map(|d| d.as_millis() as u64),
            max_idle_ms: max_idle.map(|d| d.as_millis() as u64),
        }
    }

    /// Absolute expiry instant as epoch millis, or `None` when immortal.
    ///
    /// The sooner of the lifespan deadline and the idle deadline; the idle
    /// window initially starts at the last modification.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at_from(self.last_modified)
    }

    /// Expiry instant after an access at `now`: the idle window restarts,
    /// the lifespan deadline does not move.
    pub fn accessed_expires_at_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at_from(now)
    }

    fn expires_at_from(&self, idle_start: DateTime<Utc>) -> Option<i64> {
        let lifespan_end = self
            .time_to_live_ms
            .map(|ttl| self.last_modified.timestamp_millis() + ttl as i64);
        let idle_end = self
            .max_idle_ms
            .map(|idle| idle_start.timestamp_millis() + idle as i64);
        match (lifespan_end, idle_end) {
            (Some(lifespan), Some(idle)) => Some(lifespan.min(idle)),
            (lifespan, idle) => lifespan.or(idle),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at_ms() {
            Some(at) => now.timestamp_millis() >= at,
            None => false,
        }
    }
}

/// Immutable snapshot of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub version: CacheEntryVersion,
    pub metadata: CacheEntryMetadata,
}

impl<K, V> CacheEntry<K, V> {
    pub fn new(key: K, value: V, version: CacheEntryVersion, metadata: CacheEntryMetadata) -> Self {
        Self { key, value, version, metadata }
    }

    /// Consume the entry, keeping only its value.
    pub fn into_value(self) -> V {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let v1 = CacheEntryVersion::INITIAL;
        let v2 = v1.next();
        assert!(v2 > v1);
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_metadata_expiry() {
        let now = Utc::now();
        let meta = CacheEntryMetadata::new(now, Some(Duration::from_millis(500)), None);
        assert!(!meta.is_expired(now));
        assert!(meta.is_expired(now + chrono::Duration::milliseconds(500)));
    }

    #[test]
    fn test_metadata_max_idle_expiry() {
        let now = Utc::now();
        let meta = CacheEntryMetadata::new(now, None, Some(Duration::from_millis(200)));
        assert_eq!(meta.expires_at_ms(), Some(now.timestamp_millis() + 200));
        assert!(meta.is_expired(now + chrono::Duration::milliseconds(200)));
    }

    #[test]
    fn test_metadata_sooner_of_lifespan_and_idle() {
        let now = Utc::now();
        let meta = CacheEntryMetadata::new(
            now,
            Some(Duration::from_millis(1000)),
            Some(Duration::from_millis(100)),
        );
        assert_eq!(meta.expires_at_ms(), Some(now.timestamp_millis() + 100));

        // An access restarts the idle window but cannot outlive the lifespan.
        let touched = meta.accessed_expires_at_ms(now + chrono::Duration::milliseconds(950));
        assert_eq!(touched, Some(now.timestamp_millis() + 1000));
        let early = meta.accessed_expires_at_ms(now + chrono::Duration::milliseconds(50));
        assert_eq!(early, Some(now.timestamp_millis() + 150));
    }

    #[test]
    fn test_metadata_immortal() {
        let now = Utc::now();
        let meta = CacheEntryMetadata::new(now, None, None);
        assert_eq!(meta.expires_at_ms(), None);
        assert!(!meta.is_expired(now + chrono::Duration::days(3650)));
    }

    #[test]
    fn test_updated_keeps_creation_time() {
        let created = Utc::now();
        let meta = CacheEntryMetadata::new(created, None, None);
        let later = created + chrono::Duration::seconds(5);
        let updated = meta.updated(later, Some(Duration::from_secs(1)), None);
        assert_eq!(updated.created_at, created);
        assert_eq!(updated.last_modified, later);
    }
}
