//! Connection acquisition and release.
//!
//! The store treats connections as an opaque capability behind the
//! [`ConnectionFactory`] trait: externally supplied or self-managed. The
//! bundled [`SqliteConnectionFactory`] manages one tokio-rusqlite handle
//! that runs database operations on a background thread; acquired
//! connections are cheap clones of that handle.

use std::path::Path;

use async_trait::async_trait;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite;

use crate::error::StoreError;

/// Acquires and releases database connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Hand out a connection. Pool exhaustion is a backend error.
    async fn acquire(&self) -> Result<Connection, StoreError>;

    /// Return a connection to the pool.
    async fn release(&self, conn: Connection) -> Result<(), StoreError>;
}

/// Self-managed SQLite connection factory.
///
/// Opens the database once, applies the performance pragmas (WAL mode for
/// concurrent access), and serves clones of the shared handle. Dropping the
/// factory and all outstanding clones shuts the background thread down.
#[derive(Clone, Debug)]
pub struct SqliteConnectionFactory {
    conn: Connection,
}

impl SqliteConnectionFactory {
    /// Open a database at the specified path, creating the file if absent.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Self::apply_pragmas(&conn).await?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Self::apply_pragmas(&conn).await?;
        Ok(Self { conn })
    }

    async fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;",
            )?;
            Ok(())
        })
        .await
        .map_err(StoreError::Database)
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn acquire(&self) -> Result<Connection, StoreError> {
        Ok(self.conn.clone())
    }

    async fn release(&self, conn: Connection) -> Result<(), StoreError> {
        // Clones share one background thread; dropping the clone is enough.
        drop(conn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let factory = SqliteConnectionFactory::open_in_memory().await.unwrap();
        let conn = factory.acquire().await.unwrap();
        let version = conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
        factory.release(conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_acquired_clones_share_state() {
        let factory = SqliteConnectionFactory::open_in_memory().await.unwrap();
        let first = factory.acquire().await.unwrap();
        first
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("CREATE TABLE marker (n INTEGER)")?;
                Ok(())
            })
            .await
            .unwrap();
        factory.release(first).await.unwrap();

        let second = factory.acquire().await.unwrap();
        let exists: bool = second
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='marker')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(exists);
    }
}
