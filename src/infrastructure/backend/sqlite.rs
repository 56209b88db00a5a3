//! Embedded sqlite backend

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::domain::DomainResult;
use crate::domain::cache::{Backend, CacheKey, EntryMetadata, unix_millis};
use crate::domain::error::CacheError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    key           TEXT PRIMARY KEY,
    value         BLOB NOT NULL,
    size_bytes    INTEGER NOT NULL,
    created_at    INTEGER NOT NULL,
    expires_at    INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entries_expires_at ON entries(expires_at);
CREATE INDEX IF NOT EXISTS idx_entries_last_accessed ON entries(last_accessed);
";

/// Embedded single-file store.
///
/// WAL mode allows concurrent readers alongside a writer, and expiry sweeps
/// are a single indexed `DELETE` instead of a full scan. All rusqlite calls
/// are blocking and run on the blocking thread pool, never on the async
/// runtime itself.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub async fn open(path: impl Into<PathBuf>) -> DomainResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::backend(format!("cannot create cache dir: {}", e)))?;
        }

        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| CacheError::backend(format!("task join failed: {}", e)))?
        .map_err(|e| CacheError::backend(format!("cannot open sqlite store: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> DomainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CacheError::backend("sqlite connection poisoned"))?;
            f(&guard).map_err(|e| CacheError::backend(format!("sqlite error: {}", e)))
        })
        .await
        .map_err(|e| CacheError::backend(format!("task join failed: {}", e)))?
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn get(&self, key: &CacheKey) -> DomainResult<Option<(Vec<u8>, EntryMetadata)>> {
        let hex = key.to_hex();

        self.with_conn(move |conn| {
            let now = unix_millis() as i64;

            let row = conn
                .query_row(
                    "SELECT value, size_bytes, created_at, expires_at FROM entries WHERE key = ?1",
                    params![hex],
                    |row| {
                        Ok((
                            row.get::<_, Vec<u8>>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((value, size_bytes, created_at, expires_at)) = row else {
                return Ok(None);
            };

            if now >= expires_at {
                conn.execute("DELETE FROM entries WHERE key = ?1", params![hex])?;
                return Ok(None);
            }

            conn.execute(
                "UPDATE entries SET last_accessed = ?1 WHERE key = ?2",
                params![now, hex],
            )?;

            let meta = EntryMetadata {
                created_at: created_at as u64,
                expires_at: expires_at as u64,
                last_accessed: now as u64,
                size_bytes: size_bytes as u64,
            };
            Ok(Some((value, meta)))
        })
        .await
    }

    async fn put(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> DomainResult<()> {
        let hex = key.to_hex();
        let value = value.to_vec();
        let ttl_millis = ttl.as_millis() as i64;

        self.with_conn(move |conn| {
            let now = unix_millis() as i64;

            conn.execute(
                "INSERT OR REPLACE INTO entries \
                 (key, value, size_bytes, created_at, expires_at, last_accessed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?4)",
                params![
                    hex,
                    value,
                    value.len() as i64,
                    now,
                    now.saturating_add(ttl_millis)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &CacheKey) -> DomainResult<bool> {
        let hex = key.to_hex();

        self.with_conn(move |conn| {
            let changed = conn.execute("DELETE FROM entries WHERE key = ?1", params![hex])?;
            Ok(changed > 0)
        })
        .await
    }

    async fn scan(&self, prefix: &str) -> DomainResult<Vec<CacheKey>> {
        let pattern = format!("{}%", prefix);

        let rows: Vec<String> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare("SELECT key FROM entries WHERE key LIKE ?1")?;
                let keys = stmt
                    .query_map(params![pattern], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(keys)
            })
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for hex in rows {
            match CacheKey::from_hex(&hex) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(key = %hex, error = %e, "skipping malformed key in store"),
            }
        }

        Ok(keys)
    }

    async fn stat(&self, key: &CacheKey) -> DomainResult<Option<EntryMetadata>> {
        let hex = key.to_hex();

        self.with_conn(move |conn| {
            let meta = conn
                .query_row(
                    "SELECT size_bytes, created_at, expires_at, last_accessed \
                     FROM entries WHERE key = ?1",
                    params![hex],
                    |row| {
                        Ok(EntryMetadata {
                            size_bytes: row.get::<_, i64>(0)? as u64,
                            created_at: row.get::<_, i64>(1)? as u64,
                            expires_at: row.get::<_, i64>(2)? as u64,
                            last_accessed: row.get::<_, i64>(3)? as u64,
                        })
                    },
                )
                .optional()?;
            Ok(meta)
        })
        .await
    }

    async fn size_bytes(&self) -> DomainResult<u64> {
        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM entries", [], |r| {
                    r.get(0)
                })?;
            Ok(total as u64)
        })
        .await
    }

    async fn purge_expired(&self) -> DomainResult<usize> {
        self.with_conn(|conn| {
            let now = unix_millis() as i64;
            let purged = conn.execute("DELETE FROM entries WHERE expires_at <= ?1", params![now])?;
            Ok(purged)
        })
        .await
    }

    async fn clear(&self) -> DomainResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM entries", [])?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
