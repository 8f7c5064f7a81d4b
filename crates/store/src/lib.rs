//! SQL-backed persistent store for strata caches.
//!
//! One logical table per cache, described by a [`TableSchema`] and driven by
//! [`TableManipulation`] over a pooled [`ConnectionFactory`]. Concurrent
//! read-modify-write cycles on the same key are serialized by a fixed-size
//! striped [`KeyLockManager`]. [`LocalCache`] is the in-process engine
//! implementing the `strata-core` contract on top of the store.

pub mod config;
pub mod error;
pub mod factory;
pub mod local;
pub mod lock;
pub mod schema;
pub mod store;
pub mod table;

pub use config::StoreConfig;
pub use error::StoreError;
pub use factory::{ConnectionFactory, SqliteConnectionFactory};
pub use local::LocalCache;
pub use lock::{KeyGuard, KeyLockManager};
pub use schema::TableSchema;
pub use store::{Loaded, PersistentCacheStore, RowCursor};
pub use table::{StoredRow, TableManipulation};
