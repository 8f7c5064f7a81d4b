//! In-process cache engine backed by the persistent store.
//!
//! Implements the `strata-core` contract over [`PersistentCacheStore`]. Keys
//! serialize to the id column (hex over their JSON bytes, so ids are safe
//! SQL text and reversible); value, version and metadata travel together in
//! the data column. Read-modify-write sequences hold the key's lock stripe
//! for their whole span, which gives a total order per key through this
//! engine. Cross-node ordering belongs to the clustering layer, not here.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use strata_core::{
    AsyncCache, CacheConfiguration, CacheCursor, CacheEntry, CacheEntryEvent, CacheEntryListener,
    CacheEntryMetadata, CacheEntryVersion, CacheOptions, CacheProcessorOptions, CacheWriteOptions,
    CasOutcome, EntryProcessor, Error, EventKind, ListenerHandle, ListenerRegistry, ProcessorAction,
};

use crate::config::StoreConfig;
use crate::factory::ConnectionFactory;
use crate::store::{Loaded, PersistentCacheStore, RowCursor};
use crate::table::{IMMORTAL, StoredRow};

/// Serialized payload of the data column.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoredValue<V> {
    value: V,
    version: CacheEntryVersion,
    metadata: CacheEntryMetadata,
}

fn encode_key<K: Serialize>(key: &K) -> Result<String, Error> {
    Ok(hex::encode(serde_json::to_vec(key)?))
}

fn decode_key<K: DeserializeOwned>(id: &str) -> Result<K, Error> {
    let bytes = hex::decode(id).map_err(|e| Error::backend_msg(format!("corrupt id column: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn decode_data<V: DeserializeOwned>(row: &StoredRow) -> Result<StoredValue<V>, Error> {
    Ok(serde_json::from_slice(&row.data)?)
}

fn encode_row<V: Serialize>(id: &str, stored: &StoredValue<V>) -> Result<StoredRow, Error> {
    Ok(StoredRow {
        id: id.to_string(),
        data: serde_json::to_vec(stored)?,
        timestamp: stored.metadata.expires_at_ms().unwrap_or(IMMORTAL),
    })
}

/// Local cache engine: the contract implemented over a relational store.
pub struct LocalCache<K, V> {
    config: CacheConfiguration,
    store: PersistentCacheStore,
    listeners: ListenerRegistry<K, V>,
}

impl<K, V> LocalCache<K, V>
where
    K: Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Start the backing store for `config.name()` and wrap it.
    pub async fn start(
        config: CacheConfiguration,
        store_config: &StoreConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self, Error> {
        let store = PersistentCacheStore::start(store_config, config.name(), factory).await?;
        Ok(Self { config, store, listeners: ListenerRegistry::new() })
    }

    /// Shut the engine down, honoring the store's drop-on-exit setting.
    pub async fn stop(self) -> Result<(), Error> {
        self.store.stop().await.map_err(Error::from)
    }

    /// The underlying persistent store.
    pub fn store(&self) -> &PersistentCacheStore {
        &self.store
    }

    /// Sweep expired rows; returns the count removed.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        self.store.purge_expired().await.map_err(Error::from)
    }

    fn effective_ttl(&self, options: &CacheWriteOptions) -> Option<Duration> {
        options.time_to_live.or_else(|| self.config.default_time_to_live())
    }

    fn effective_max_idle(&self, options: &CacheWriteOptions) -> Option<Duration> {
        options.max_idle.or_else(|| self.config.default_max_idle())
    }

    fn emit(&self, kind: EventKind, key: &K, entry: Option<CacheEntry<K, V>>, skip: bool) {
        if skip || self.listeners.is_empty() {
            return;
        }
        self.listeners.emit(&CacheEntryEvent { kind, key: key.clone(), entry });
    }

    fn entry_owned(&self, key: &K, stored: StoredValue<V>) -> CacheEntry<K, V> {
        CacheEntry::new(key.clone(), stored.value, stored.version, stored.metadata)
    }

    fn entry_borrowed(&self, key: &K, stored: &StoredValue<V>) -> CacheEntry<K, V> {
        CacheEntry::new(key.clone(), stored.value.clone(), stored.version, stored.metadata.clone())
    }

    /// Load and decode the current envelope for `id`, emitting an expired
    /// event when the row died of old age.
    ///
    /// A hit on an entry with a max-idle window counts as an access: the
    /// row's expiry instant is pushed out accordingly.
    async fn load_stored(&self, id: &str, key: &K, skip: bool) -> Result<Option<StoredValue<V>>, Error> {
        match self.store.load_detailed(id).await? {
            Loaded::Hit(row) => {
                let stored: StoredValue<V> = decode_data(&row)?;
                if stored.metadata.max_idle_ms.is_some() {
                    if let Some(expiry) = stored.metadata.accessed_expires_at_ms(Utc::now()) {
                        self.store.touch(id, expiry).await?;
                    }
                }
                Ok(Some(stored))
            }
            Loaded::Expired => {
                self.emit(EventKind::Expired, key, None, skip);
                Ok(None)
            }
            Loaded::Miss => Ok(None),
        }
    }

    /// Write the next generation of `key`. Caller holds the key's stripe.
    async fn write_next(
        &self,
        id: &str,
        key: &K,
        value: V,
        previous: Option<&StoredValue<V>>,
        options: CacheWriteOptions,
    ) -> Result<CacheEntry<K, V>, Error> {
        let now = Utc::now();
        let version = previous.map(|p| p.version.next()).unwrap_or(CacheEntryVersion::INITIAL);
        let metadata = match previous {
            Some(p) => p
                .metadata
                .updated(now, self.effective_ttl(&options), self.effective_max_idle(&options)),
            None => CacheEntryMetadata::new(now, self.effective_ttl(&options), self.effective_max_idle(&options)),
        };
        let stored = StoredValue { value, version, metadata };
        let row = encode_row(id, &stored)?;
        self.store.store_under_lock(&row).await?;
        Ok(self.entry_owned(key, stored))
    }

    async fn apply_processor(
        &self,
        key: &K,
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<Option<Value>, Error> {
        let id = encode_key(key)?;
        let _guard = self.store.lock(&id).await?;
        let skip = options.write.skip_notifications();
        let previous = self.load_stored(&id, key, skip).await?;
        let snapshot = previous.as_ref().map(|p| self.entry_borrowed(key, p));

        let action = processor.process(key, snapshot.as_ref());
        let output = action.output().cloned();
        match action {
            ProcessorAction::Keep(_) => {}
            ProcessorAction::Write(value, _) => {
                let entry = self.write_next(&id, key, value, previous.as_ref(), options.write).await?;
                let kind = if previous.is_some() { EventKind::Updated } else { EventKind::Created };
                self.emit(kind, key, Some(entry), skip);
            }
            ProcessorAction::Remove(_) => {
                if previous.is_some() {
                    self.store.delete_under_lock(&id).await?;
                    self.emit(EventKind::Removed, key, None, skip);
                }
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl<K, V> AsyncCache<K, V> for LocalCache<K, V>
where
    K: Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.config.name()
    }

    fn configuration(&self) -> &CacheConfiguration {
        &self.config
    }

    async fn get_entry(&self, key: &K, options: CacheOptions) -> Result<Option<CacheEntry<K, V>>, Error> {
        let id = encode_key(key)?;
        let stored = self.load_stored(&id, key, options.skip_notifications()).await?;
        Ok(stored.map(|s| self.entry_owned(key, s)))
    }

    async fn put(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error> {
        let id = encode_key(&key)?;
        let _guard = self.store.lock(&id).await?;
        let skip = options.skip_notifications();
        let previous = self.load_stored(&id, &key, skip).await?;
        let entry = self.write_next(&id, &key, value, previous.as_ref(), options).await?;
        let kind = if previous.is_some() { EventKind::Updated } else { EventKind::Created };
        self.emit(kind, &key, Some(entry), skip);
        Ok(previous.map(|p| p.value))
    }

    async fn set(&self, key: K, value: V, options: CacheWriteOptions) -> Result<(), Error> {
        // The previous envelope is still loaded for the version chain, but
        // its value is never returned.
        self.put(key, value, options).await.map(|_| ())
    }

    async fn put_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error> {
        let id = encode_key(&key)?;
        let _guard = self.store.lock(&id).await?;
        let skip = options.skip_notifications();
        match self.load_stored(&id, &key, skip).await? {
            Some(previous) => Ok(Some(previous.value)),
            None => {
                let entry = self.write_next(&id, &key, value, None, options).await?;
                self.emit(EventKind::Created, &key, Some(entry), skip);
                Ok(None)
            }
        }
    }

    async fn set_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<bool, Error> {
        Ok(self.put_if_absent(key, value, options).await?.is_none())
    }

    async fn replace(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<bool, Error> {
        Ok(self.get_or_replace_entry(key, value, version, options).await?.replaced())
    }

    async fn get_or_replace_entry(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<CasOutcome<K, V>, Error> {
        let id = encode_key(key)?;
        let _guard = self.store.lock(&id).await?;
        let skip = options.skip_notifications();
        match self.load_stored(&id, key, skip).await? {
            None => Ok(CasOutcome::Absent),
            Some(previous) if previous.version == version => {
                let entry = self.write_next(&id, key, value, Some(&previous), options).await?;
                self.emit(EventKind::Updated, key, Some(entry.clone()), skip);
                Ok(CasOutcome::Replaced(entry))
            }
            Some(previous) => Ok(CasOutcome::Conflict(self.entry_owned(key, previous))),
        }
    }

    async fn remove(&self, key: &K, options: CacheOptions) -> Result<bool, Error> {
        let id = encode_key(key)?;
        let _guard = self.store.lock(&id).await?;
        let removed = self.store.delete_under_lock(&id).await?;
        if removed {
            self.emit(EventKind::Removed, key, None, options.skip_notifications());
        }
        Ok(removed)
    }

    async fn remove_if_version(
        &self,
        key: &K,
        version: CacheEntryVersion,
        options: CacheOptions,
    ) -> Result<bool, Error> {
        let id = encode_key(key)?;
        let _guard = self.store.lock(&id).await?;
        let skip = options.skip_notifications();
        match self.load_stored(&id, key, skip).await? {
            Some(current) if current.version == version => {
                self.store.delete_under_lock(&id).await?;
                self.emit(EventKind::Removed, key, None, skip);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_and_remove(&self, key: &K, options: CacheOptions) -> Result<Option<V>, Error> {
        let id = encode_key(key)?;
        let _guard = self.store.lock(&id).await?;
        let skip = options.skip_notifications();
        match self.load_stored(&id, key, skip).await? {
            Some(current) => {
                self.store.delete_under_lock(&id).await?;
                self.emit(EventKind::Removed, key, None, skip);
                Ok(Some(current.value))
            }
            None => Ok(None),
        }
    }

    async fn put_all(&self, entries: Vec<(K, V)>, options: CacheWriteOptions) -> Result<(), Error> {
        // Each key independently; a failure leaves earlier keys written.
        for (key, value) in entries {
            self.put(key, value, options).await?;
        }
        Ok(())
    }

    async fn get_all(&self, keys: &[K], options: CacheOptions) -> Result<HashMap<K, V>, Error> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = self.get_entry(key, options).await? {
                found.insert(key.clone(), entry.into_value());
            }
        }
        Ok(found)
    }

    async fn remove_all(&self, keys: &[K], options: CacheOptions) -> Result<HashSet<K>, Error> {
        let mut removed = HashSet::new();
        for key in keys {
            if self.remove(key, options).await? {
                removed.insert(key.clone());
            }
        }
        Ok(removed)
    }

    async fn get_and_remove_all(&self, keys: &[K], options: CacheOptions) -> Result<HashMap<K, V>, Error> {
        let mut removed = HashMap::new();
        for key in keys {
            if let Some(value) = self.get_and_remove(key, options).await? {
                removed.insert(key.clone(), value);
            }
        }
        Ok(removed)
    }

    async fn keys(&self, _options: CacheOptions) -> Result<Box<dyn CacheCursor<K>>, Error> {
        let rows = self.store.load_all().await?;
        Ok(Box::new(KeyCursor { rows, _marker: PhantomData }))
    }

    async fn entries(&self, _options: CacheOptions) -> Result<Box<dyn CacheCursor<CacheEntry<K, V>>>, Error> {
        let rows = self.store.load_all().await?;
        Ok(Box::new(EntryCursor { rows, _marker: PhantomData }))
    }

    async fn estimate_size(&self, _options: CacheOptions) -> Result<u64, Error> {
        self.store.count().await.map_err(Error::from)
    }

    async fn clear(&self, _options: CacheOptions) -> Result<(), Error> {
        let wiped = self.store.clear().await?;
        tracing::debug!(cache = %self.config.name(), rows = wiped, "cache cleared");
        Ok(())
    }

    async fn query(&self, _query: &str, _options: CacheOptions) -> Result<Vec<Value>, Error> {
        // The relational store has no query engine; query is a capability of
        // other backends.
        Err(Error::NotSupported("query"))
    }

    async fn process(
        &self,
        keys: &[K],
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error> {
        let mut outputs = HashMap::new();
        for key in keys {
            if let Some(output) = self.apply_processor(key, processor, options).await? {
                outputs.insert(key.clone(), output);
            }
        }
        Ok(outputs)
    }

    async fn process_all(
        &self,
        processor: &dyn EntryProcessor<K, V>,
        options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error> {
        let mut cursor = self.store.load_all().await?;
        let mut keys = Vec::new();
        let collected: Result<(), Error> = loop {
            match cursor.next().await {
                Ok(Some(row)) => match decode_key(&row.id) {
                    Ok(key) => keys.push(key),
                    Err(e) => break Err(e),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        };
        cursor.close().await?;
        collected?;

        self.process(&keys, processor, options).await
    }

    fn listen(&self, listener: Arc<dyn CacheEntryListener<K, V>>) -> Result<ListenerHandle, Error> {
        Ok(self.listeners.register(listener))
    }
}

/// Cursor decoding the key column.
struct KeyCursor<K> {
    rows: RowCursor,
    _marker: PhantomData<fn() -> K>,
}

#[async_trait]
impl<K> CacheCursor<K> for KeyCursor<K>
where
    K: DeserializeOwned + Send,
{
    async fn next(&mut self) -> Result<Option<K>, Error> {
        match self.rows.next().await? {
            Some(row) => Ok(Some(decode_key(&row.id)?)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.rows.close().await.map_err(Error::from)
    }
}

/// Cursor decoding full entries.
struct EntryCursor<K, V> {
    rows: RowCursor,
    _marker: PhantomData<fn() -> (K, V)>,
}

#[async_trait]
impl<K, V> CacheCursor<CacheEntry<K, V>> for EntryCursor<K, V>
where
    K: DeserializeOwned + Send,
    V: DeserializeOwned + Send,
{
    async fn next(&mut self) -> Result<Option<CacheEntry<K, V>>, Error> {
        match self.rows.next().await? {
            Some(row) => {
                let key: K = decode_key(&row.id)?;
                let stored: StoredValue<V> = decode_data(&row)?;
                Ok(Some(CacheEntry::new(key, stored.value, stored.version, stored.metadata)))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.rows.close().await.map_err(Error::from)
    }
}
