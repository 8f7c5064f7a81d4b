//! In-memory cache backend shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{AsyncCache, CacheCursor, CasOutcome};
use crate::config::CacheConfiguration;
use crate::entry::{CacheEntry, CacheEntryMetadata, CacheEntryVersion};
use crate::error::Error;
use crate::events::{CacheEntryListener, ListenerHandle};
use crate::options::{CacheOptions, CacheProcessorOptions, CacheWriteOptions};
use crate::process::EntryProcessor;

/// Minimal in-memory backend: point operations work, everything streaming or
/// server-side reports `NotSupported`, mirroring a constrained remote binding.
pub(crate) struct MapCache {
    config: CacheConfiguration,
    entries: Mutex<HashMap<String, CacheEntry<String, String>>>,
}

impl MapCache {
    pub(crate) fn new() -> Self {
        Self {
            config: CacheConfiguration::builder("map").build().unwrap(),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AsyncCache<String, String> for MapCache {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn configuration(&self) -> &CacheConfiguration {
        &self.config
    }

    async fn get_entry(
        &self,
        key: &String,
        _options: CacheOptions,
    ) -> Result<Option<CacheEntry<String, String>>, Error> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: String, value: String, _options: CacheWriteOptions) -> Result<Option<String>, Error> {
        let mut entries = self.entries.lock().unwrap();
        let version = entries
            .get(&key)
            .map(|e| e.version.next())
            .unwrap_or(CacheEntryVersion::INITIAL);
        let metadata = CacheEntryMetadata::new(chrono::Utc::now(), None, None);
        let previous = entries.insert(key.clone(), CacheEntry::new(key, value, version, metadata));
        Ok(previous.map(CacheEntry::into_value))
    }

    async fn set(&self, key: String, value: String, options: CacheWriteOptions) -> Result<(), Error> {
        self.put(key, value, options).await.map(|_| ())
    }

    async fn put_if_absent(
        &self,
        key: String,
        value: String,
        options: CacheWriteOptions,
    ) -> Result<Option<String>, Error> {
        let existing = self.get(&key, options.read_options()).await?;
        match existing {
            Some(value) => Ok(Some(value)),
            None => self.put(key, value, options).await,
        }
    }

    async fn set_if_absent(&self, key: String, value: String, options: CacheWriteOptions) -> Result<bool, Error> {
        Ok(self.put_if_absent(key, value, options).await?.is_none())
    }

    async fn replace(
        &self,
        key: &String,
        value: String,
        version: CacheEntryVersion,
        _options: CacheWriteOptions,
    ) -> Result<bool, Error> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(current) if current.version == version => {
                let metadata = current.metadata.updated(chrono::Utc::now(), None, None);
                let entry = CacheEntry::new(key.clone(), value, version.next(), metadata);
                entries.insert(key.clone(), entry);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_or_replace_entry(
        &self,
        key: &String,
        value: String,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<CasOutcome<String, String>, Error> {
        if self.replace(key, value, version, options).await? {
            let entry = self.get_entry(key, options.read_options()).await?;
            return Ok(entry.map(CasOutcome::Replaced).unwrap_or(CasOutcome::Absent));
        }
        match self.get_entry(key, options.read_options()).await? {
            Some(current) => Ok(CasOutcome::Conflict(current)),
            None => Ok(CasOutcome::Absent),
        }
    }

    async fn remove(&self, key: &String, _options: CacheOptions) -> Result<bool, Error> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn remove_if_version(
        &self,
        key: &String,
        version: CacheEntryVersion,
        _options: CacheOptions,
    ) -> Result<bool, Error> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(current) if current.version == version => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_and_remove(&self, key: &String, _options: CacheOptions) -> Result<Option<String>, Error> {
        Ok(self.entries.lock().unwrap().remove(key).map(CacheEntry::into_value))
    }

    async fn put_all(&self, entries: Vec<(String, String)>, options: CacheWriteOptions) -> Result<(), Error> {
        for (key, value) in entries {
            self.put(key, value, options).await?;
        }
        Ok(())
    }

    async fn get_all(&self, keys: &[String], _options: CacheOptions) -> Result<HashMap<String, String>, Error> {
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|e| (k.clone(), e.value.clone())))
            .collect())
    }

    async fn remove_all(&self, keys: &[String], options: CacheOptions) -> Result<HashSet<String>, Error> {
        let mut removed = HashSet::new();
        for key in keys {
            if self.remove(key, options).await? {
                removed.insert(key.clone());
            }
        }
        Ok(removed)
    }

    async fn get_and_remove_all(
        &self,
        keys: &[String],
        options: CacheOptions,
    ) -> Result<HashMap<String, String>, Error> {
        let mut removed = HashMap::new();
        for key in keys {
            if let Some(value) = self.get_and_remove(key, options).await? {
                removed.insert(key.clone(), value);
            }
        }
        Ok(removed)
    }

    async fn keys(&self, _options: CacheOptions) -> Result<Box<dyn CacheCursor<String>>, Error> {
        Err(Error::NotSupported("keys"))
    }

    async fn entries(
        &self,
        _options: CacheOptions,
    ) -> Result<Box<dyn CacheCursor<CacheEntry<String, String>>>, Error> {
        Err(Error::NotSupported("entries"))
    }

    async fn estimate_size(&self, _options: CacheOptions) -> Result<u64, Error> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }

    async fn clear(&self, _options: CacheOptions) -> Result<(), Error> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    async fn query(&self, _query: &str, _options: CacheOptions) -> Result<Vec<Value>, Error> {
        Err(Error::NotSupported("query"))
    }

    async fn process(
        &self,
        _keys: &[String],
        _processor: &dyn EntryProcessor<String, String>,
        _options: CacheProcessorOptions,
    ) -> Result<HashMap<String, Value>, Error> {
        Err(Error::NotSupported("process"))
    }

    async fn process_all(
        &self,
        _processor: &dyn EntryProcessor<String, String>,
        _options: CacheProcessorOptions,
    ) -> Result<HashMap<String, Value>, Error> {
        Err(Error::NotSupported("process_all"))
    }

    fn listen(&self, _listener: Arc<dyn CacheEntryListener<String, String>>) -> Result<ListenerHandle, Error> {
        Err(Error::NotSupported("listen"))
    }
}
