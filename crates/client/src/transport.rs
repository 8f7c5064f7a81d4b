//! Wire protocol between [`crate::RemoteCache`] and a cache server.
//!
//! Requests and responses are self-describing tagged JSON values. Keys and
//! values travel as `serde_json::Value` so the transport stays untyped; the
//! client is responsible for encoding and decoding its `K`/`V` parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_core::{CacheEntryMetadata, CacheWriteOptions, Error};

/// Expiry and flag settings attached to a write request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WireWriteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_ms: Option<u64>,
    #[serde(default)]
    pub skip_notifications: bool,
}

impl From<CacheWriteOptions> for WireWriteOptions {
    fn from(options: CacheWriteOptions) -> Self {
        Self {
            time_to_live_ms: options.time_to_live.map(|d| d.as_millis() as u64),
            max_idle_ms: options.max_idle.map(|d| d.as_millis() as u64),
            skip_notifications: options.skip_notifications(),
        }
    }
}

/// A stored entry as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntry {
    pub key: Value,
    pub value: Value,
    pub version: u64,
    pub metadata: CacheEntryMetadata,
}

/// One cache operation, addressed to a named cache by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CacheRequest {
    GetEntry { key: Value },
    Put { key: Value, value: Value, write: WireWriteOptions },
    Set { key: Value, value: Value, write: WireWriteOptions },
    PutIfAbsent { key: Value, value: Value, write: WireWriteOptions },
    SetIfAbsent { key: Value, value: Value, write: WireWriteOptions },
    Replace { key: Value, value: Value, version: u64, write: WireWriteOptions },
    GetOrReplace { key: Value, value: Value, version: u64, write: WireWriteOptions },
    Remove { key: Value },
    RemoveIfVersion { key: Value, version: u64 },
    GetAndRemove { key: Value },
    PutAll { entries: Vec<(Value, Value)>, write: WireWriteOptions },
    EstimateSize,
    Clear,
    Query { query: String },
}

impl CacheRequest {
    /// Short operation name for logging.
    pub fn op_name(&self) -> &'static str {
        match self {
            CacheRequest::GetEntry { .. } => "get_entry",
            CacheRequest::Put { .. } => "put",
            CacheRequest::Set { .. } => "set",
            CacheRequest::PutIfAbsent { .. } => "put_if_absent",
            CacheRequest::SetIfAbsent { .. } => "set_if_absent",
            CacheRequest::Replace { .. } => "replace",
            CacheRequest::GetOrReplace { .. } => "get_or_replace",
            CacheRequest::Remove { .. } => "remove",
            CacheRequest::RemoveIfVersion { .. } => "remove_if_version",
            CacheRequest::GetAndRemove { .. } => "get_and_remove",
            CacheRequest::PutAll { .. } => "put_all",
            CacheRequest::EstimateSize => "estimate_size",
            CacheRequest::Clear => "clear",
            CacheRequest::Query { .. } => "query",
        }
    }
}

/// The server's answer to one [`CacheRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CacheResponse {
    /// Full entry or absence, for reads.
    Entry { entry: Option<WireEntry> },
    /// Previous or removed value, for value-returning writes.
    Value { value: Option<Value> },
    /// Success flag, for conditional operations.
    Bool { value: bool },
    /// Cardinality, for size estimates.
    Count { value: u64 },
    /// Compare-and-swap succeeded; carries the written entry.
    CasReplaced { entry: WireEntry },
    /// Compare-and-swap lost; carries the current entry.
    CasConflict { entry: WireEntry },
    /// Compare-and-swap target absent.
    CasAbsent,
    /// Query result rows.
    Rows { rows: Vec<Value> },
    /// Acknowledged, nothing to return.
    Ok,
    /// Server-side failure.
    Error { code: String, message: String },
}

/// Delivery mechanism for cache requests.
///
/// Implementations address the named cache on whatever medium they wrap and
/// must map their own failures into [`Error::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, cache: &str, request: CacheRequest) -> Result<CacheResponse, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let request = CacheRequest::Replace {
            key: Value::from("k"),
            value: Value::from("v"),
            version: 3,
            write: WireWriteOptions::default(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "replace");
        assert_eq!(json["version"], 3);
    }

    #[test]
    fn test_response_round_trip() {
        let response = CacheResponse::Value { value: Some(Value::from(7)) };
        let json = serde_json::to_string(&response).unwrap();
        let back: CacheResponse = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, CacheResponse::Value { value: Some(v) } if v == Value::from(7)));
    }

    #[test]
    fn test_write_options_conversion() {
        let options = CacheWriteOptions::with_ttl(std::time::Duration::from_secs(2));
        let wire = WireWriteOptions::from(options);
        assert_eq!(wire.time_to_live_ms, Some(2000));
        assert_eq!(wire.max_idle_ms, None);
        assert!(!wire.skip_notifications);
    }
}
