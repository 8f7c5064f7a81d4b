//! Client-side cache delegating operations to a [`Transport`].

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use strata_core::{
    AsyncCache, CacheConfiguration, CacheCursor, CacheEntry, CacheEntryListener, CacheEntryVersion,
    CacheOptions, CacheProcessorOptions, CacheWriteOptions, CasOutcome, EntryProcessor, Error,
    ListenerHandle,
};

use crate::transport::{CacheRequest, CacheResponse, Transport, WireEntry};

/// Cache accessor backed by a remote server.
///
/// Point operations, bulk writes, `estimate_size`, `clear` and `query` go
/// over the wire. Keyspace streaming, bulk reads, listeners and entry
/// processors are not part of the remote protocol and fail with
/// [`Error::NotSupported`] before any request is sent.
pub struct RemoteCache<K, V> {
    config: CacheConfiguration,
    transport: Arc<dyn Transport>,
    _marker: PhantomData<fn(K, V)>,
}

impl<K, V> RemoteCache<K, V>
where
    K: Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: CacheConfiguration, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport, _marker: PhantomData }
    }

    fn encode<T: Serialize>(value: &T) -> Result<Value, Error> {
        Ok(serde_json::to_value(value)?)
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
        Ok(serde_json::from_value(value)?)
    }

    fn decode_opt<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>, Error> {
        value.map(Self::decode).transpose()
    }

    fn entry_from_wire(wire: WireEntry) -> Result<CacheEntry<K, V>, Error> {
        Ok(CacheEntry::new(
            Self::decode(wire.key)?,
            Self::decode(wire.value)?,
            CacheEntryVersion::new(wire.version),
            wire.metadata,
        ))
    }

    fn unexpected(op: &'static str) -> Error {
        Error::transport_msg(format!("unexpected response shape for {op}"))
    }

    async fn send(&self, request: CacheRequest) -> Result<CacheResponse, Error> {
        let op = request.op_name();
        tracing::trace!(cache = %self.config.name(), op, "dispatching request");
        match self.transport.dispatch(self.config.name(), request).await? {
            CacheResponse::Error { code, message } => {
                Err(Error::transport_msg(format!("remote {op} failed: {code}: {message}")))
            }
            response => Ok(response),
        }
    }
}

#[async_trait]
impl<K, V> AsyncCache<K, V> for RemoteCache<K, V>
where
    K: Clone + Eq + Hash + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.config.name()
    }

    fn configuration(&self) -> &CacheConfiguration {
        &self.config
    }

    async fn get_entry(&self, key: &K, _options: CacheOptions) -> Result<Option<CacheEntry<K, V>>, Error> {
        let request = CacheRequest::GetEntry { key: Self::encode(key)? };
        match self.send(request).await? {
            CacheResponse::Entry { entry } => entry.map(Self::entry_from_wire).transpose(),
            _ => Err(Self::unexpected("get_entry")),
        }
    }

    async fn put(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error> {
        let request = CacheRequest::Put {
            key: Self::encode(&key)?,
            value: Self::encode(&value)?,
            write: options.into(),
        };
        match self.send(request).await? {
            CacheResponse::Value { value } => Self::decode_opt(value),
            _ => Err(Self::unexpected("put")),
        }
    }

    async fn set(&self, key: K, value: V, options: CacheWriteOptions) -> Result<(), Error> {
        let request = CacheRequest::Set {
            key: Self::encode(&key)?,
            value: Self::encode(&value)?,
            write: options.into(),
        };
        match self.send(request).await? {
            CacheResponse::Ok => Ok(()),
            _ => Err(Self::unexpected("set")),
        }
    }

    async fn put_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<Option<V>, Error> {
        let request = CacheRequest::PutIfAbsent {
            key: Self::encode(&key)?,
            value: Self::encode(&value)?,
            write: options.into(),
        };
        match self.send(request).await? {
            CacheResponse::Value { value } => Self::decode_opt(value),
            _ => Err(Self::unexpected("put_if_absent")),
        }
    }

    async fn set_if_absent(&self, key: K, value: V, options: CacheWriteOptions) -> Result<bool, Error> {
        let request = CacheRequest::SetIfAbsent {
            key: Self::encode(&key)?,
            value: Self::encode(&value)?,
            write: options.into(),
        };
        match self.send(request).await? {
            CacheResponse::Bool { value } => Ok(value),
            _ => Err(Self::unexpected("set_if_absent")),
        }
    }

    async fn replace(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<bool, Error> {
        let request = CacheRequest::Replace {
            key: Self::encode(key)?,
            value: Self::encode(&value)?,
            version: version.value(),
            write: options.into(),
        };
        match self.send(request).await? {
            CacheResponse::Bool { value } => Ok(value),
            _ => Err(Self::unexpected("replace")),
        }
    }

    async fn get_or_replace_entry(
        &self,
        key: &K,
        value: V,
        version: CacheEntryVersion,
        options: CacheWriteOptions,
    ) -> Result<CasOutcome<K, V>, Error> {
        let request = CacheRequest::GetOrReplace {
            key: Self::encode(key)?,
            value: Self::encode(&value)?,
            version: version.value(),
            write: options.into(),
        };
        match self.send(request).await? {
            CacheResponse::CasReplaced { entry } => Ok(CasOutcome::Replaced(Self::entry_from_wire(entry)?)),
            CacheResponse::CasConflict { entry } => Ok(CasOutcome::Conflict(Self::entry_from_wire(entry)?)),
            CacheResponse::CasAbsent => Ok(CasOutcome::Absent),
            _ => Err(Self::unexpected("get_or_replace_entry")),
        }
    }

    async fn remove(&self, key: &K, _options: CacheOptions) -> Result<bool, Error> {
        let request = CacheRequest::Remove { key: Self::encode(key)? };
        match self.send(request).await? {
            CacheResponse::Bool { value } => Ok(value),
            _ => Err(Self::unexpected("remove")),
        }
    }

    async fn remove_if_version(
        &self,
        key: &K,
        version: CacheEntryVersion,
        _options: CacheOptions,
    ) -> Result<bool, Error> {
        let request = CacheRequest::RemoveIfVersion { key: Self::encode(key)?, version: version.value() };
        match self.send(request).await? {
            CacheResponse::Bool { value } => Ok(value),
            _ => Err(Self::unexpected("remove_if_version")),
        }
    }

    async fn get_and_remove(&self, key: &K, _options: CacheOptions) -> Result<Option<V>, Error> {
        let request = CacheRequest::GetAndRemove { key: Self::encode(key)? };
        match self.send(request).await? {
            CacheResponse::Value { value } => Self::decode_opt(value),
            _ => Err(Self::unexpected("get_and_remove")),
        }
    }

    async fn put_all(&self, entries: Vec<(K, V)>, options: CacheWriteOptions) -> Result<(), Error> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            encoded.push((Self::encode(key)?, Self::encode(value)?));
        }
        let request = CacheRequest::PutAll { entries: encoded, write: options.into() };
        match self.send(request).await? {
            CacheResponse::Ok => Ok(()),
            _ => Err(Self::unexpected("put_all")),
        }
    }

    async fn get_all(&self, _keys: &[K], _options: CacheOptions) -> Result<HashMap<K, V>, Error> {
        Err(Error::NotSupported("get_all"))
    }

    async fn remove_all(&self, _keys: &[K], _options: CacheOptions) -> Result<HashSet<K>, Error> {
        Err(Error::NotSupported("remove_all"))
    }

    async fn get_and_remove_all(&self, _keys: &[K], _options: CacheOptions) -> Result<HashMap<K, V>, Error> {
        Err(Error::NotSupported("get_and_remove_all"))
    }

    async fn keys(&self, _options: CacheOptions) -> Result<Box<dyn CacheCursor<K>>, Error> {
        Err(Error::NotSupported("keys"))
    }

    async fn entries(&self, _options: CacheOptions) -> Result<Box<dyn CacheCursor<CacheEntry<K, V>>>, Error> {
        Err(Error::NotSupported("entries"))
    }

    async fn estimate_size(&self, _options: CacheOptions) -> Result<u64, Error> {
        match self.send(CacheRequest::EstimateSize).await? {
            CacheResponse::Count { value } => Ok(value),
            _ => Err(Self::unexpected("estimate_size")),
        }
    }

    async fn clear(&self, _options: CacheOptions) -> Result<(), Error> {
        match self.send(CacheRequest::Clear).await? {
            CacheResponse::Ok => Ok(()),
            _ => Err(Self::unexpected("clear")),
        }
    }

    async fn query(&self, query: &str, _options: CacheOptions) -> Result<Vec<Value>, Error> {
        let request = CacheRequest::Query { query: query.to_string() };
        match self.send(request).await? {
            CacheResponse::Rows { rows } => Ok(rows),
            _ => Err(Self::unexpected("query")),
        }
    }

    async fn process(
        &self,
        _keys: &[K],
        _processor: &dyn EntryProcessor<K, V>,
        _options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error> {
        // Processors are local closures; they cannot travel to the server.
        Err(Error::NotSupported("process"))
    }

    async fn process_all(
        &self,
        _processor: &dyn EntryProcessor<K, V>,
        _options: CacheProcessorOptions,
    ) -> Result<HashMap<K, Value>, Error> {
        Err(Error::NotSupported("process_all"))
    }

    fn listen(&self, _listener: Arc<dyn CacheEntryListener<K, V>>) -> Result<ListenerHandle, Error> {
        Err(Error::NotSupported("listen"))
    }
}
