//! Durable backing for a single cache's entries.
//!
//! Composes [`TableManipulation`] over a [`ConnectionFactory`] with per-key
//! serialization via [`KeyLockManager`]. Table lifecycle is tied to store
//! lifecycle: the table can be created on start and dropped on stop. Every
//! write path takes the key's stripe before touching a connection, never the
//! reverse, so lock and connection acquisition cannot invert into a deadlock.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::factory::ConnectionFactory;
use crate::lock::{KeyGuard, KeyLockManager};
use crate::schema::TableSchema;
use crate::table::{StoredRow, TableManipulation};

/// Result of a point load, distinguishing a lazily expired row from a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded {
    Hit(StoredRow),
    Expired,
    Miss,
}

/// A started persistent store for one cache.
///
/// Existence implies a successful `start`: the schema validated and the
/// backing table present. Dropping the store releases the connection
/// factory; use [`PersistentCacheStore::stop`] to also drop the table.
pub struct PersistentCacheStore {
    table: TableManipulation,
    factory: Arc<dyn ConnectionFactory>,
    locks: KeyLockManager,
    drop_table_on_exit: bool,
}

impl PersistentCacheStore {
    /// Validate the schema and bring the store up.
    ///
    /// With `create_table_on_start` the table is created if absent; DDL
    /// failure is fatal. Without it, a missing table fails the start since
    /// the table is required.
    pub async fn start(
        config: &StoreConfig,
        cache_name: &str,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self, StoreError> {
        let schema = TableSchema::from_config(config, cache_name)?;
        let table = TableManipulation::new(schema, config.fetch_size, config.batch_size);

        let conn = factory.acquire().await?;
        let outcome = Self::prepare_table(&table, &conn, config.create_table_on_start).await;
        factory.release(conn).await?;
        outcome?;

        tracing::debug!(
            table = %table.schema().table_name(),
            stripes = config.lock_concurrency_level,
            "persistent store started"
        );

        Ok(Self {
            table,
            factory,
            locks: KeyLockManager::new(config.lock_concurrency_level, config.lock_acquisition_timeout()),
            drop_table_on_exit: config.drop_table_on_exit,
        })
    }

    async fn prepare_table(
        table: &TableManipulation,
        conn: &Connection,
        create_on_start: bool,
    ) -> Result<(), StoreError> {
        if create_on_start {
            table.create_table(conn).await
        } else if table.table_exists(conn).await? {
            Ok(())
        } else {
            Err(StoreError::MissingTable(table.schema().table_name().to_string()))
        }
    }

    pub fn table(&self) -> &TableManipulation {
        &self.table
    }

    pub fn schema(&self) -> &TableSchema {
        self.table.schema()
    }

    /// Acquire the lock stripe for `id` with the configured bounded wait.
    ///
    /// For callers composing a read-modify-write across [`Self::load`] and
    /// [`Self::store_under_lock`]; the plain [`Self::store`] / [`Self::delete`]
    /// lock internally.
    pub async fn lock(&self, id: &str) -> Result<KeyGuard, StoreError> {
        self.locks.lock(id).await
    }

    /// Load the row for `id`, treating an expired row as absent.
    ///
    /// An expired row is deleted lazily on observation.
    pub async fn load(&self, id: &str) -> Result<Option<StoredRow>, StoreError> {
        match self.load_detailed(id).await? {
            Loaded::Hit(row) => Ok(Some(row)),
            Loaded::Expired | Loaded::Miss => Ok(None),
        }
    }

    /// Like [`Self::load`] but reports expiry distinctly, so the engine can
    /// emit an expired event.
    pub async fn load_detailed(&self, id: &str) -> Result<Loaded, StoreError> {
        let now = now_ms();
        let conn = self.factory.acquire().await?;
        let result = self.table.select_row(&conn, id).await;
        let outcome = match result {
            Ok(Some(row)) if row.is_expired(now) => {
                // Lazy expiry without the key's stripe: the delete is gated
                // on the expiry still holding, so a row a concurrent writer
                // upserted under the stripe survives.
                let deleted = self.table.delete_expired_row(&conn, id, now).await;
                self.factory.release(conn).await?;
                deleted?;
                return Ok(Loaded::Expired);
            }
            Ok(Some(row)) => Ok(Loaded::Hit(row)),
            Ok(None) => Ok(Loaded::Miss),
            Err(e) => Err(e),
        };
        self.factory.release(conn).await?;
        outcome
    }

    /// Write `row` under its key stripe.
    pub async fn store(&self, row: &StoredRow) -> Result<(), StoreError> {
        let _guard = self.locks.lock(&row.id).await?;
        self.store_under_lock(row).await
    }

    /// Write `row` assuming the caller already holds its stripe.
    pub async fn store_under_lock(&self, row: &StoredRow) -> Result<(), StoreError> {
        let conn = self.factory.acquire().await?;
        let result = self.table.upsert_row(&conn, row).await;
        self.factory.release(conn).await?;
        result
    }

    /// Delete the row for `id` under its key stripe; `true` if it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.locks.lock(id).await?;
        self.delete_under_lock(id).await
    }

    /// Delete assuming the caller already holds the stripe for `id`.
    pub async fn delete_under_lock(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.factory.acquire().await?;
        let result = self.table.delete_row(&conn, id).await;
        self.factory.release(conn).await?;
        result
    }

    /// Bulk write in batch-size chunks, one transaction per chunk.
    ///
    /// A bulk-load path (state import): no per-key stripes, no cross-chunk
    /// atomicity. A failed chunk leaves earlier chunks written.
    pub async fn store_all(&self, rows: Vec<StoredRow>) -> Result<(), StoreError> {
        let conn = self.factory.acquire().await?;
        let mut result = Ok(());
        for chunk in rows.chunks(self.table.batch_size()) {
            if let Err(e) = self.table.upsert_rows(&conn, chunk.to_vec()).await {
                result = Err(e);
                break;
            }
        }
        self.factory.release(conn).await?;
        result
    }

    /// Lazy, fetch-size-bounded sequence over all live rows.
    pub async fn load_all(&self) -> Result<RowCursor, StoreError> {
        let conn = self.factory.acquire().await?;
        Ok(RowCursor {
            table: self.table.clone(),
            factory: Arc::clone(&self.factory),
            conn: Some(conn),
            last_id: String::new(),
            buffer: VecDeque::new(),
            exhausted: false,
            now_ms: now_ms(),
        })
    }

    /// Push a mortal row's expiry out to `expires_at_ms`; `true` when the
    /// row was updated. Monotone: never shortens a concurrently written
    /// deadline, so the read path may call it without the key's stripe.
    pub async fn touch(&self, id: &str, expires_at_ms: i64) -> Result<bool, StoreError> {
        let conn = self.factory.acquire().await?;
        let result = self.table.touch_row(&conn, id, expires_at_ms).await;
        self.factory.release(conn).await?;
        result
    }

    /// Best-effort wipe of the whole table.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let conn = self.factory.acquire().await?;
        let result = self.table.delete_all(&conn).await;
        self.factory.release(conn).await?;
        result
    }

    /// Approximate row count; races with concurrent mutation by contract.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let conn = self.factory.acquire().await?;
        let result = self.table.count(&conn).await;
        self.factory.release(conn).await?;
        result
    }

    /// Remove every row whose expiry has passed; returns the count removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let conn = self.factory.acquire().await?;
        let result = self.table.purge_expired(&conn, now_ms()).await;
        self.factory.release(conn).await?;
        result
    }

    /// Shut the store down, dropping the table when configured to.
    pub async fn stop(self) -> Result<(), StoreError> {
        if self.drop_table_on_exit {
            let conn = self.factory.acquire().await?;
            let result = self.table.drop_table(&conn).await;
            self.factory.release(conn).await?;
            result?;
        }
        tracing::debug!(table = %self.table.schema().table_name(), "persistent store stopped");
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Paged cursor over the table, bounded by the configured fetch size.
///
/// Must be closed to return its connection to the factory, whether or not
/// iteration ran to exhaustion.
pub struct RowCursor {
    table: TableManipulation,
    factory: Arc<dyn ConnectionFactory>,
    conn: Option<Connection>,
    last_id: String,
    buffer: VecDeque<StoredRow>,
    exhausted: bool,
    now_ms: i64,
}

impl RowCursor {
    /// The next live row, or `None` once the table is exhausted or the
    /// cursor was closed.
    pub async fn next(&mut self) -> Result<Option<StoredRow>, StoreError> {
        if self.buffer.is_empty() && !self.exhausted {
            let Some(conn) = self.conn.as_ref() else {
                return Ok(None);
            };
            let page = self.table.select_page(conn, &self.last_id, self.now_ms).await?;
            if page.len() < self.table.fetch_size() {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.last_id = last.id.clone();
            }
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }

    /// Return the underlying connection to the factory.
    pub async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            self.factory.release(conn).await?;
        }
        self.buffer.clear();
        self.exhausted = true;
        Ok(())
    }
}
