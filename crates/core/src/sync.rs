//! Blocking facade over an asynchronous cache backend.
//!
//! Wraps any [`AsyncCache`] together with a tokio runtime handle; every call
//! blocks the calling thread until the underlying operation completes, then
//! returns the value or re-raises the failure unchanged. Operations the
//! backend does not implement pass through as [`Error::NotSupported`] rather
//! than degrading silently.
//!
//! Must not be called from inside the wrapped runtime's own async context:
//! `Handle::block_on` panics there by design. The facade is meant for plain
//! threads driving an async engine.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::cache::{AsyncCache, CacheCursor, CasOutcome};
use crate::config::CacheConfiguration;
use crate::entry::{CacheEntry, CacheEntryVersion};
use crate::error::Error;
use crate::events::{CacheEntryListener, ListenerHandle};
use crate::options::{CacheOptions, CacheProcessorOptions, CacheWriteOptions};
use crate::process::EntryProcessor;

/// Synchronous adapter over an async cache engine.
pub struct SyncCache<C, K, V> {
    inner: C,
    handle: Handle,
    _marker: PhantomData<fn(K, V)>,
}

impl<C, K, V> SyncCache<C, K, V>
where
    C: AsyncCache<K, V>,
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Wrap `inner`, awaiting its operations on the runtime behind `handle`.
    pub fn new(inner: C, handle: Handle) -> Self {
        Self { inner, handle, _marker: PhantomData }
    }

    /// The wrapped async cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn configuration(&self) -> &CacheConfiguration {
        self.inner.configuration()
    }

    pub fn get(&self, key: &K, options: CacheOptions) -> Result<Option<V>, Error> {
        self.handle.block_on(self.inner.get(key, options))
    }

    pub fn get_entry(&self, key: &K, options: CacheOptions) -> Result<Option<CacheEntry<K, V>>, Error> {
        self.handle.block_on(self.inner.get_entry(key, options))
    }

    pub fn put(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error> {
        self.handle.block_on(self.inner.put(key, value, options))
    }

    pub fn set(&self, key: K, value: V, options: CacheWriteOptions) -> Result<(), Error> {
        self.handle.block_on(self.inner.set(key, value, options))
    }

    pub fn put_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error> {
        self.handle.block_on(self.inner.put_if_absent(key, value, options))
    }

    pub fn set_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<bool, Error> {
        self.handle.block_on(self.inner.set_if_absent(key, value, options))
    }

    pub fn replace(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<bool, Error> {
        self.handle.block_on(self.inner.replace(key, value, version, options))
    }

    pub fn get_or_replace_entry(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<CasOutcome<K, V>, Error> {
        self.handle
            .block_on(self.inner.get_or_replace_entry(key, value, version, options))
    }

    pub fn remove(&self, key: &K, options: CacheOptions) -> Result<bool, Error> {
        self.handle.block_on(self.inner.remove(key, options))
    }

    pub fn remove_if_version(
        &self,
        key: &K,
        version: CacheEntryVersion,
        options: CacheOptions,
    ) -> Result<bool, Error> {
        self.handle.block_on(self.inner.remove_if_version(key, version, options))
    }

    pub fn get_and_remove(&self, key: &K, options: CacheOptions) -> Result<Option<V>, Error> {
        self.handle.block_on(self.inner.get_and_remove(key, options))
    }

    pub fn put_all(&self, entries: Vec<(K, V)>, options: CacheWriteOptions) -> Result<(), Error> {
        self.handle.block_on(self.inner.put_all(entries, options))
    }

    pub fn get_all(&self, keys: &[K], options: CacheOptions) -> Result<HashMap<K, V>, Error> {
        self.handle.block_on(self.inner.get_all(keys, options))
    }

    pub fn remove_all(&self, keys: &[K], options: CacheOptions) -> Result<HashSet<K>, Error> {
        self.handle.block_on(self.inner.remove_all(keys, options))
    }

    pub fn get_and_remove_all(&self, keys: &[K], options: CacheOptions) -> Result<HashMap<K, V>, Error> {
        self.handle.block_on(self.inner.get_and_remove_all(keys, options))
    }

    /// Blocking view over the keyspace; see [`SyncCursor`].
    pub fn keys(&self, options: CacheOptions) -> Result<SyncCursor<K>, Error> {
        let cursor = self.handle.block_on(self.inner.keys(options))?;
        Ok(SyncCursor { inner: cursor, handle: self.handle.clone() })
    }

    /// Blocking view over all entries; see [`SyncCursor`].
    pub fn entries(&self, options: CacheOptions) -> Result<SyncCursor<CacheEntry<K, V>>, Error> {
        let cursor = self.handle.block_on(self.inner.entries(options))?;
        Ok(SyncCursor { inner: cursor, handle: self.handle.clone() })
    }

    pub fn estimate_size(&self, options: CacheOptions) -> Result<u64, Error> {
        self.handle.block_on(self.inner.estimate_size(options))
    }

    pub fn clear(&self, options: CacheOptions) -> Result<(), Error> {
        self.handle.block_on(self.inner.clear(options))
    }

    pub fn query(&self, query: &str, options: CacheOptions) -> Result<Vec<Value>, Error> {
        self.handle.block_on(self.inner.query(query, options))
    }

    pub fn process(
        &self,
        keys: &[K],
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error> {
        self.handle.block_on(self.inner.process(keys, processor, options))
    }

    pub fn process_all(
        &self,
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error> {
        self.handle.block_on(self.inner.process_all(processor, options))
    }

    pub fn listen(&self, listener: Arc<dyn CacheEntryListener<K, V>>) -> Result<ListenerHandle, Error> {
        self.inner.listen(listener)
    }
}

/// Blocking wrapper over an async [`CacheCursor`].
///
/// The same close contract applies: call [`SyncCursor::close`] even when
/// abandoning iteration early.
pub struct SyncCursor<T: Send> {
    inner: Box<dyn CacheCursor<T>>,
    handle: Handle,
}

impl<T: Send> SyncCursor<T> {
    pub fn next(&mut self) -> Result<Option<T>, Error> {
        self.handle.block_on(self.inner.next())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.handle.block_on(self.inner.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MapCache;
    use tokio::runtime::Runtime;

    fn sync_cache(rt: &Runtime) -> SyncCache<MapCache, String, String> {
        SyncCache::new(MapCache::new(), rt.handle().clone())
    }

    #[test]
    fn test_blocking_round_trip() {
        let rt = Runtime::new().unwrap();
        let cache = sync_cache(&rt);

        assert_eq!(cache.get(&"k".into(), CacheOptions::DEFAULT).unwrap(), None);
        cache.put("k".into(), "v".into(), CacheWriteOptions::DEFAULT).unwrap();
        assert_eq!(cache.get(&"k".into(), CacheOptions::DEFAULT).unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_blocking_cas() {
        let rt = Runtime::new().unwrap();
        let cache = sync_cache(&rt);

        cache.put("k".into(), "a".into(), CacheWriteOptions::DEFAULT).unwrap();
        let version = cache
            .get_entry(&"k".into(), CacheOptions::DEFAULT)
            .unwrap()
            .unwrap()
            .version;

        assert!(cache.replace(&"k".into(), "b".into(), version, CacheWriteOptions::DEFAULT).unwrap());
        // The old version is now stale.
        assert!(!cache.replace(&"k".into(), "c".into(), version, CacheWriteOptions::DEFAULT).unwrap());
        assert_eq!(cache.get(&"k".into(), CacheOptions::DEFAULT).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_not_supported_passes_through() {
        let rt = Runtime::new().unwrap();
        let cache = sync_cache(&rt);

        let err = cache.keys(CacheOptions::DEFAULT).err().unwrap();
        assert!(matches!(err, Error::NotSupported("keys")));
    }

    #[test]
    fn test_bulk_remove_reports_existing_subset() {
        let rt = Runtime::new().unwrap();
        let cache = sync_cache(&rt);

        cache.put("k1".into(), "a".into(), CacheWriteOptions::DEFAULT).unwrap();
        let removed = cache
            .remove_all(&["k1".into(), "k2".into()], CacheOptions::DEFAULT)
            .unwrap();
        assert_eq!(removed, HashSet::from(["k1".to_string()]));
    }
}
