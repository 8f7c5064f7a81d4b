//! Core types and the cache-access contract for strata.
//!
//! This crate provides:
//! - The versioned entry model (`CacheEntry`, `CacheEntryVersion`)
//! - Per-call options with shared defaults
//! - The asynchronous `AsyncCache` contract
//! - A blocking `SyncCache` facade over any async backend
//! - Entry lifecycle events and listener registration
//! - Unified error taxonomy

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod options;
pub mod process;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{AsyncCache, CacheCursor, CasOutcome};
pub use config::CacheConfiguration;
pub use entry::{CacheEntry, CacheEntryMetadata, CacheEntryVersion};
pub use error::Error;
pub use events::{CacheEntryEvent, CacheEntryListener, EventKind, ListenerHandle, ListenerRegistry};
pub use options::{CacheFlags, CacheOptions, CacheProcessorOptions, CacheWriteOptions};
pub use process::{EntryProcessor, ProcessorAction};
pub use sync::{SyncCache, SyncCursor};
