//! DDL and DML for the table backing one cache.
//!
//! Pure mapping responsibility: given a [`TableSchema`], produce and execute
//! the statement shapes (create/drop, select-by-id, upsert, delete, paged
//! select, count, expiry purge). No business logic lives here; driver errors
//! propagate unchanged and retry policy belongs to the caller.

use tokio_rusqlite::{Connection, params};
use tokio_rusqlite::rusqlite;

use crate::error::StoreError;
use crate::schema::TableSchema;

/// Timestamp column value for rows that never expire.
pub const IMMORTAL: i64 = -1;

/// Physical encoding of a cache entry as a relational row.
///
/// `id` uniquely identifies a key (the table holds no duplicate ids);
/// `data` is the serialized value+version+metadata envelope; `timestamp`
/// is the absolute expiry instant in epoch millis, or [`IMMORTAL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub id: String,
    pub data: Vec<u8>,
    pub timestamp: i64,
}

impl StoredRow {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.timestamp >= 0 && self.timestamp <= now_ms
    }
}

/// Issues DDL and DML against the table described by a [`TableSchema`].
#[derive(Debug, Clone)]
pub struct TableManipulation {
    schema: TableSchema,
    fetch_size: usize,
    batch_size: usize,
}

impl TableManipulation {
    pub fn new(schema: TableSchema, fetch_size: usize, batch_size: usize) -> Self {
        Self { schema, fetch_size, batch_size }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {t} ({id} {id_type} NOT NULL PRIMARY KEY, {data} {data_type}, {ts} {ts_type} NOT NULL)",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
            id_type = self.schema.id_column_type(),
            data = self.schema.data_column_name(),
            data_type = self.schema.data_column_type(),
            ts = self.schema.timestamp_column_name(),
            ts_type = self.schema.timestamp_column_type(),
        )
    }

    fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.schema.table_name())
    }

    fn select_row_sql(&self) -> String {
        format!(
            "SELECT {id}, {data}, {ts} FROM {t} WHERE {id} = ?1",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
            data = self.schema.data_column_name(),
            ts = self.schema.timestamp_column_name(),
        )
    }

    fn upsert_row_sql(&self) -> String {
        format!(
            "INSERT INTO {t} ({id}, {data}, {ts}) VALUES (?1, ?2, ?3)
             ON CONFLICT({id}) DO UPDATE SET {data} = excluded.{data}, {ts} = excluded.{ts}",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
            data = self.schema.data_column_name(),
            ts = self.schema.timestamp_column_name(),
        )
    }

    fn delete_row_sql(&self) -> String {
        format!(
            "DELETE FROM {t} WHERE {id} = ?1",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
        )
    }

    fn delete_all_sql(&self) -> String {
        format!("DELETE FROM {}", self.schema.table_name())
    }

    fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.schema.table_name())
    }

    fn select_page_sql(&self) -> String {
        // Keyset pagination over the primary key keeps memory bounded by the
        // fetch size regardless of table cardinality.
        format!(
            "SELECT {id}, {data}, {ts} FROM {t} WHERE {id} > ?1 AND ({ts} < 0 OR {ts} > ?2)
             ORDER BY {id} LIMIT ?3",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
            data = self.schema.data_column_name(),
            ts = self.schema.timestamp_column_name(),
        )
    }

    fn delete_expired_row_sql(&self) -> String {
        format!(
            "DELETE FROM {t} WHERE {id} = ?1 AND {ts} >= 0 AND {ts} <= ?2",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
            ts = self.schema.timestamp_column_name(),
        )
    }

    fn touch_row_sql(&self) -> String {
        // Only pushes the expiry further out; cannot resurrect a missing or
        // immortal row and cannot shorten a deadline written concurrently.
        format!(
            "UPDATE {t} SET {ts} = ?2 WHERE {id} = ?1 AND {ts} >= 0 AND {ts} < ?2",
            t = self.schema.table_name(),
            id = self.schema.id_column_name(),
            ts = self.schema.timestamp_column_name(),
        )
    }

    fn purge_expired_sql(&self) -> String {
        format!(
            "DELETE FROM {t} WHERE {ts} >= 0 AND {ts} <= ?1",
            t = self.schema.table_name(),
            ts = self.schema.timestamp_column_name(),
        )
    }

    pub async fn create_table(&self, conn: &Connection) -> Result<(), StoreError> {
        let sql = self.create_table_sql();
        tracing::debug!(table = %self.schema.table_name(), "creating table");
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await
        .map_err(StoreError::from)
    }

    pub async fn drop_table(&self, conn: &Connection) -> Result<(), StoreError> {
        let sql = self.drop_table_sql();
        tracing::debug!(table = %self.schema.table_name(), "dropping table");
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await
        .map_err(StoreError::from)
    }

    pub async fn table_exists(&self, conn: &Connection) -> Result<bool, StoreError> {
        let table = self.schema.table_name().to_string();
        conn.call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                params![table],
                |row| row.get(0),
            )
        })
        .await
        .map_err(StoreError::from)
    }

    pub async fn select_row(&self, conn: &Connection, id: &str) -> Result<Option<StoredRow>, StoreError> {
        let sql = self.select_row_sql();
        let id = id.to_string();
        conn.call(move |conn| {
            let result = conn.query_row(&sql, params![id], |row| {
                Ok(StoredRow { id: row.get(0)?, data: row.get(1)?, timestamp: row.get(2)? })
            });
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(StoreError::from)
    }

    pub async fn upsert_row(&self, conn: &Connection, row: &StoredRow) -> Result<(), StoreError> {
        let sql = self.upsert_row_sql();
        let row = row.clone();
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(&sql, params![row.id, row.data, row.timestamp])?;
            Ok(())
        })
        .await
        .map_err(StoreError::from)
    }

    /// Upsert `rows` in one transaction.
    pub async fn upsert_rows(&self, conn: &Connection, rows: Vec<StoredRow>) -> Result<(), StoreError> {
        let sql = self.upsert_row_sql();
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            for row in &rows {
                tx.execute(&sql, params![row.id, row.data, row.timestamp])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(StoreError::from)
    }

    /// Delete by id; `true` when a row existed.
    pub async fn delete_row(&self, conn: &Connection, id: &str) -> Result<bool, StoreError> {
        let sql = self.delete_row_sql();
        let id = id.to_string();
        conn.call(move |conn| -> Result<bool, rusqlite::Error> {
            let affected = conn.execute(&sql, params![id])?;
            Ok(affected > 0)
        })
        .await
        .map_err(StoreError::from)
    }

    pub async fn delete_all(&self, conn: &Connection) -> Result<u64, StoreError> {
        let sql = self.delete_all_sql();
        conn.call(move |conn| -> Result<u64, rusqlite::Error> {
            let affected = conn.execute(&sql, [])?;
            Ok(affected as u64)
        })
        .await
        .map_err(StoreError::from)
    }

    pub async fn count(&self, conn: &Connection) -> Result<u64, StoreError> {
        let sql = self.count_sql();
        conn.call(move |conn| -> Result<u64, rusqlite::Error> {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
        .map_err(StoreError::from)
    }

    /// One page of live rows with id greater than `after`, in id order.
    pub async fn select_page(
        &self,
        conn: &Connection,
        after: &str,
        now_ms: i64,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let sql = self.select_page_sql();
        let after = after.to_string();
        let limit = self.fetch_size as i64;
        conn.call(move |conn| -> Result<Vec<StoredRow>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![after, now_ms, limit], |row| {
                    Ok(StoredRow { id: row.get(0)?, data: row.get(1)?, timestamp: row.get(2)? })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(StoreError::from)
    }

    /// Delete by id only if the row's expiry instant is still at or before
    /// `now_ms`; `true` when removed.
    ///
    /// For lazy expiry on the read path: a concurrent writer may have
    /// replaced the observed dead row with a live one, and that fresh row
    /// must survive the reader's cleanup.
    pub async fn delete_expired_row(
        &self,
        conn: &Connection,
        id: &str,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        let sql = self.delete_expired_row_sql();
        let id = id.to_string();
        conn.call(move |conn| -> Result<bool, rusqlite::Error> {
            let affected = conn.execute(&sql, params![id, now_ms])?;
            Ok(affected > 0)
        })
        .await
        .map_err(StoreError::from)
    }

    /// Push a mortal row's expiry out to `expires_at_ms`; `true` when the
    /// row was updated. Never shortens a deadline and ignores immortal rows.
    pub async fn touch_row(
        &self,
        conn: &Connection,
        id: &str,
        expires_at_ms: i64,
    ) -> Result<bool, StoreError> {
        let sql = self.touch_row_sql();
        let id = id.to_string();
        conn.call(move |conn| -> Result<bool, rusqlite::Error> {
            let affected = conn.execute(&sql, params![id, expires_at_ms])?;
            Ok(affected > 0)
        })
        .await
        .map_err(StoreError::from)
    }

    /// Delete rows whose expiry has passed; returns the count removed.
    pub async fn purge_expired(&self, conn: &Connection, now_ms: i64) -> Result<u64, StoreError> {
        let sql = self.purge_expired_sql();
        conn.call(move |conn| -> Result<u64, rusqlite::Error> {
            let affected = conn.execute(&sql, params![now_ms])?;
            Ok(affected as u64)
        })
        .await
        .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::factory::{ConnectionFactory, SqliteConnectionFactory};

    async fn table_on(conn: &Connection) -> TableManipulation {
        let schema = TableSchema::from_config(&StoreConfig::default(), "t").unwrap();
        let table = TableManipulation::new(schema, 2, 128);
        table.create_table(conn).await.unwrap();
        table
    }

    async fn connection() -> Connection {
        let factory = SqliteConnectionFactory::open_in_memory().await.unwrap();
        factory.acquire().await.unwrap()
    }

    fn row(id: &str, data: &[u8]) -> StoredRow {
        StoredRow { id: id.into(), data: data.to_vec(), timestamp: IMMORTAL }
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let conn = connection().await;
        let table = table_on(&conn).await;
        table.create_table(&conn).await.unwrap();
        assert!(table.table_exists(&conn).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_and_select() {
        let conn = connection().await;
        let table = table_on(&conn).await;

        table.upsert_row(&conn, &row("a", b"one")).await.unwrap();
        table.upsert_row(&conn, &row("a", b"two")).await.unwrap();

        let loaded = table.select_row(&conn, "a").await.unwrap().unwrap();
        assert_eq!(loaded.data, b"two");
        assert_eq!(table.count(&conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_select_missing() {
        let conn = connection().await;
        let table = table_on(&conn).await;
        assert_eq!(table.select_row(&conn, "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let conn = connection().await;
        let table = table_on(&conn).await;
        table.upsert_row(&conn, &row("a", b"x")).await.unwrap();

        assert!(table.delete_row(&conn, "a").await.unwrap());
        assert!(!table.delete_row(&conn, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_paged_select_orders_and_bounds() {
        let conn = connection().await;
        let table = table_on(&conn).await; // fetch_size = 2

        for id in ["c", "a", "d", "b"] {
            table.upsert_row(&conn, &row(id, id.as_bytes())).await.unwrap();
        }

        let first = table.select_page(&conn, "", 0).await.unwrap();
        assert_eq!(first.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        let second = table.select_page(&conn, "b", 0).await.unwrap();
        assert_eq!(second.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["c", "d"]);

        let rest = table.select_page(&conn, "d", 0).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_page_skips_expired_rows() {
        let conn = connection().await;
        let table = table_on(&conn).await;
        table.upsert_row(&conn, &StoredRow { id: "a".into(), data: vec![], timestamp: 10 }).await.unwrap();
        table.upsert_row(&conn, &row("b", b"live")).await.unwrap();

        let page = table.select_page(&conn, "", 50).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["b"]);
    }

    #[tokio::test]
    async fn test_upsert_rows_in_one_batch() {
        let conn = connection().await;
        let table = table_on(&conn).await;

        table
            .upsert_rows(&conn, vec![row("a", b"1"), row("b", b"2"), row("a", b"3")])
            .await
            .unwrap();

        assert_eq!(table.count(&conn).await.unwrap(), 2);
        assert_eq!(table.select_row(&conn, "a").await.unwrap().unwrap().data, b"3");
    }

    #[tokio::test]
    async fn test_delete_expired_row_spares_replacement() {
        let conn = connection().await;
        let table = table_on(&conn).await;

        table.upsert_row(&conn, &StoredRow { id: "a".into(), data: vec![], timestamp: 10 }).await.unwrap();
        assert!(table.delete_expired_row(&conn, "a", 50).await.unwrap());

        // A writer replaced the dead row before the reader's cleanup landed;
        // the live replacement must not be collateral damage.
        table.upsert_row(&conn, &StoredRow { id: "a".into(), data: b"new".to_vec(), timestamp: 1_000 }).await.unwrap();
        assert!(!table.delete_expired_row(&conn, "a", 50).await.unwrap());
        assert_eq!(table.select_row(&conn, "a").await.unwrap().unwrap().data, b"new");
    }

    #[tokio::test]
    async fn test_touch_row_only_extends() {
        let conn = connection().await;
        let table = table_on(&conn).await;

        table.upsert_row(&conn, &StoredRow { id: "a".into(), data: vec![], timestamp: 100 }).await.unwrap();
        assert!(table.touch_row(&conn, "a", 200).await.unwrap());
        assert_eq!(table.select_row(&conn, "a").await.unwrap().unwrap().timestamp, 200);

        // Shorter deadline, immortal row, missing row: all untouched.
        assert!(!table.touch_row(&conn, "a", 150).await.unwrap());
        assert_eq!(table.select_row(&conn, "a").await.unwrap().unwrap().timestamp, 200);

        table.upsert_row(&conn, &row("forever", b"x")).await.unwrap();
        assert!(!table.touch_row(&conn, "forever", 500).await.unwrap());
        assert!(!table.touch_row(&conn, "absent", 500).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let conn = connection().await;
        let table = table_on(&conn).await;
        table.upsert_row(&conn, &StoredRow { id: "a".into(), data: vec![], timestamp: 10 }).await.unwrap();
        table.upsert_row(&conn, &row("b", b"live")).await.unwrap();

        assert_eq!(table.purge_expired(&conn, 50).await.unwrap(), 1);
        assert_eq!(table.count(&conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_table() {
        let conn = connection().await;
        let table = table_on(&conn).await;
        table.drop_table(&conn).await.unwrap();
        assert!(!table.table_exists(&conn).await.unwrap());
    }
}
