//! The asynchronous cache-access contract.
//!
//! `AsyncCache` is the operation set a cache exposes to callers, independent
//! of whether the backing engine is a local persistent store or a remote
//! delegate. Absence is a normal result (`None`), a failed compare-and-swap
//! is a normal result (`false` or [`CasOutcome::Conflict`]), and operations a
//! backend does not implement surface as [`Error::NotSupported`] so callers
//! can tell "not found" from "not implemented".

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::CacheConfiguration;
use crate::entry::{CacheEntry, CacheEntryVersion};
use crate::error::Error;
use crate::events::{CacheEntryListener, ListenerHandle};
use crate::options::{CacheOptions, CacheProcessorOptions, CacheWriteOptions};
use crate::process::EntryProcessor;

/// Outcome of a combined replace-or-read operation.
///
/// On a conflict the current entry is returned so the caller can retry with
/// the fresh version instead of issuing a separate read.
#[derive(Debug, Clone)]
pub enum CasOutcome<K, V> {
    /// The swap succeeded; carries the newly written entry.
    Replaced(CacheEntry<K, V>),
    /// The expected version did not match; carries the current entry.
    Conflict(CacheEntry<K, V>),
    /// The key does not exist; nothing was written.
    Absent,
}

impl<K, V> CasOutcome<K, V> {
    pub fn replaced(&self) -> bool {
        matches!(self, CasOutcome::Replaced(_))
    }
}

/// A lazily evaluated, single-pass sequence over cache data.
///
/// Finite and not guaranteed restartable. Consumers must call `close` to
/// release backend cursors and connections even when abandoning the sequence
/// before exhaustion.
#[async_trait]
pub trait CacheCursor<T: Send>: Send {
    /// The next element, or `None` once the sequence is exhausted.
    async fn next(&mut self) -> Result<Option<T>, Error>;

    /// Release backend resources held by this cursor.
    async fn close(&mut self) -> Result<(), Error>;
}

/// The cache-access contract.
///
/// One primitive per behavior, each taking an options value; callers wanting
/// defaults pass `CacheOptions::DEFAULT` / `CacheWriteOptions::DEFAULT`.
/// Bulk variants give no cross-key atomicity: each key is processed
/// independently and a partial failure leaves the other keys untouched.
#[async_trait]
pub trait AsyncCache<K, V>: Send + Sync
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// The name this cache was created under.
    fn name(&self) -> &str;

    /// The immutable configuration bound to this cache.
    fn configuration(&self) -> &CacheConfiguration;

    /// The primitive read: the full entry including its version, or `None`.
    ///
    /// Every convenience read is defined in terms of this.
    async fn get_entry(&self, key: &K, options: CacheOptions) -> Result<Option<CacheEntry<K, V>>, Error>;

    /// The current value of `key`, or `None`.
    async fn get(&self, key: &K, options: CacheOptions) -> Result<Option<V>, Error> {
        Ok(self.get_entry(key, options).await?.map(CacheEntry::into_value))
    }

    /// Unconditional upsert returning the previous value.
    async fn put(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error>;

    /// Unconditional upsert discarding the previous value.
    ///
    /// A side-effect optimization: the backend need not read the prior value.
    async fn set(&self, key: K, value: V, options: CacheWriteOptions) -> Result<(), Error>;

    /// Write only if the key is absent; returns the existing value otherwise.
    async fn put_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error>;

    /// Write only if the key is absent; `true` when the write happened.
    async fn set_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<bool, Error>;

    /// Compare-and-swap: succeeds iff the key's current version equals
    /// `version`. On success a strictly newer version is assigned; on failure
    /// the stored value is untouched and `false` is returned.
    async fn replace(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<bool, Error>;

    /// Compare-and-swap combined with a read; see [`CasOutcome`].
    async fn get_or_replace_entry(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<CasOutcome<K, V>, Error>;

    /// Unconditional delete; `true` when an entry existed.
    async fn remove(&self, key: &K, options: CacheOptions) -> Result<bool, Error>;

    /// Version-gated delete; succeeds iff the current version matches.
    async fn remove_if_version(
        &self,
        key: &K,
        version: CacheEntryVersion,
        options: CacheOptions,
    ) -> Result<bool, Error>;

    /// Atomic read-then-delete.
    async fn get_and_remove(&self, key: &K, options: CacheOptions) -> Result<Option<V>, Error>;

    /// Write each pair independently; no cross-key atomicity.
    async fn put_all(&self, entries: Vec<(K, V)>, options: CacheWriteOptions) -> Result<(), Error>;

    /// The subset of `keys` present, with their values.
    async fn get_all(&self, keys: &[K], options: CacheOptions) -> Result<HashMap<K, V>, Error>;

    /// Delete each key independently; returns exactly the keys that existed.
    async fn remove_all(&self, keys: &[K], options: CacheOptions) -> Result<HashSet<K>, Error>;

    /// Delete each key independently, returning the removed pairs.
    async fn get_and_remove_all(&self, keys: &[K], options: CacheOptions) -> Result<HashMap<K, V>, Error>;

    /// Closable sequence over the whole keyspace.
    async fn keys(&self, options: CacheOptions) -> Result<Box<dyn CacheCursor<K>>, Error>;

    /// Closable sequence over all entries.
    async fn entries(&self, options: CacheOptions) -> Result<Box<dyn CacheCursor<CacheEntry<K, V>>>, Error>;

    /// Approximate cardinality; may race with concurrent mutation.
    async fn estimate_size(&self, options: CacheOptions) -> Result<u64, Error>;

    /// Best-effort full wipe; concurrent writers may repopulate during it.
    async fn clear(&self, options: CacheOptions) -> Result<(), Error>;

    /// Push a query predicate to the backend. A backend capability, not a
    /// mandatory contract member.
    async fn query(&self, query: &str, options: CacheOptions) -> Result<Vec<Value>, Error>;

    /// Apply `processor` to each of `keys` where the entries live, returning
    /// the per-key outputs it produced.
    async fn process(
        &self,
        keys: &[K],
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error>;

    /// Apply `processor` to every entry in the cache.
    async fn process_all(
        &self,
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error>;

    /// Register an entry lifecycle listener. The returned handle is the only
    /// way to cancel the subscription.
    fn listen(&self, listener: Arc<dyn CacheEntryListener<K, V>>) -> Result<ListenerHandle, Error>;
}
