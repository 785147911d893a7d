//! SQLite implementation of the record store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{IndexRecord, RecordStore, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 4;

/// SQLite-backed record store.
///
/// Reads go straight to the pool; inserts and deletes hold `write_lock` so
/// the check-then-insert on a hash cannot interleave between workers.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

#[derive(FromRow)]
struct RecordRow {
    hash: String,
    author: String,
    author_id: String,
    author_link: String,
    width: i64,
    height: i64,
    origin_link: String,
    path: String,
    size: i64,
}

impl From<RecordRow> for IndexRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            hash: row.hash,
            author: row.author,
            author_id: row.author_id,
            author_link: row.author_link,
            width: u32::try_from(row.width).unwrap_or_default(),
            height: u32::try_from(row.height).unwrap_or_default(),
            origin_link: row.origin_link,
            path: row.path,
            size: u64::try_from(row.size).unwrap_or_default(),
        }
    }
}

impl SqliteRecordStore {
    /// Open (creating if needed) the index at `path`.
    ///
    /// `signature` identifies the hasher producing the keys. A new index
    /// records it; an existing index built with another signature is refused.
    pub async fn open(path: &Path, signature: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self::from_pool(pool);
        store.create_tables().await?;
        store.check_signature(signature).await?;

        info!(path = %path.display(), signature, "Record store opened");
        Ok(store)
    }

    /// Wrap an existing pool; tables are not created.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saberdb (
                hash TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_link TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                origin_link TEXT NOT NULL,
                path TEXT NOT NULL,
                size INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn check_signature(&self, signature: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('signature', ?)")
            .bind(signature)
            .execute(&self.pool)
            .await?;

        let stored: String = sqlx::query_scalar("SELECT value FROM meta WHERE key = 'signature'")
            .fetch_one(&self.pool)
            .await?;

        if stored != signature {
            return Err(StoreError::IndexMismatch {
                expected: signature.to_string(),
                found: stored,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn lookup(&self, hash: &str) -> Result<Option<IndexRecord>, StoreError> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT hash, author, author_id, author_link, width, height, origin_link, path, size
            FROM saberdb
            WHERE hash = ?
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, record: &IndexRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            r#"
            INSERT INTO saberdb (hash, author, author_id, author_link, width, height, origin_link, path, size)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.hash)
        .bind(&record.author)
        .bind(&record.author_id)
        .bind(&record.author_link)
        .bind(i64::from(record.width))
        .bind(i64::from(record.height))
        .bind(&record.origin_link)
        .bind(&record.path)
        .bind(i64::try_from(record.size).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(hash = %record.hash, path = %record.path, "Indexed record");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(record.hash.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, hash: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM saberdb WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn all(&self) -> Result<Vec<IndexRecord>, StoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT hash, author, author_id, author_link, width, height, origin_link, path, size
            FROM saberdb
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
