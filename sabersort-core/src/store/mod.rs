//! Record store: the persistent index of already-sorted images.
//!
//! Records are keyed by the hex perceptual hash of the source image, so a
//! re-run over the same input skips anything already resolved and saved.
//! The index also tracks where each saved file went, which lets a run detect
//! outputs that were deleted or replaced since.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hasher::{PerceptualHash, PerceptualHasher};

/// Errors raised by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database failed
    #[error("Database connection error: {0}")]
    Connection(String),

    /// SQL query execution failed
    #[error("Query error: {0}")]
    Query(String),

    /// A record with this hash is already indexed
    #[error("Hash already indexed: {0}")]
    Duplicate(String),

    /// The index was built with a different hash algorithm or size
    #[error("Index was built with {found}, hasher is {expected}")]
    IndexMismatch { expected: String, found: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// One indexed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Hex perceptual hash of the source image (primary key)
    pub hash: String,
    pub author: String,
    pub author_id: String,
    pub author_link: String,
    pub width: u32,
    pub height: u32,
    /// Post the image was resolved to
    pub origin_link: String,
    /// Where the resolved image was saved
    pub path: String,
    /// Byte size of the saved file
    pub size: u64,
}

/// Persistence for [`IndexRecord`]s.
///
/// Implementations must keep hashes unique: `insert` of a known hash fails
/// with [`StoreError::Duplicate`]. Records are never updated in place.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn lookup(&self, hash: &str) -> Result<Option<IndexRecord>, StoreError>;

    async fn insert(&self, record: &IndexRecord) -> Result<(), StoreError>;

    /// Remove the record for `hash`; returns whether one existed.
    async fn delete(&self, hash: &str) -> Result<bool, StoreError>;

    /// Every record, in no particular order.
    async fn all(&self) -> Result<Vec<IndexRecord>, StoreError>;
}

/// Whether the file at `path` still hashes to `expected`.
async fn file_matches(hasher: &PerceptualHasher, path: &Path, expected: &str) -> bool {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Indexed file unreadable");
            return false;
        }
    };
    match hasher.hash_bytes_blocking(data).await {
        Ok(fresh) => fresh.to_hex() == expected,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Indexed file no longer decodes");
            false
        }
    }
}

/// Look up `hash` and check the indexed file.
///
/// Returns `(found, valid)`: `(false, false)` for an unknown hash,
/// `(true, false)` when the saved file is gone or no longer hashes to the
/// key, `(true, true)` otherwise.
pub async fn exists_and_valid<S>(
    store: &S,
    hasher: &PerceptualHasher,
    hash: &PerceptualHash,
) -> Result<(bool, bool), StoreError>
where
    S: RecordStore + ?Sized,
{
    let key = hash.to_hex();
    let Some(record) = store.lookup(&key).await? else {
        return Ok((false, false));
    };
    let path = Path::new(&record.path);
    if !path.is_file() {
        return Ok((true, false));
    }
    Ok((true, file_matches(hasher, path, &key).await))
}

/// Outcome of [`prune_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub checked: usize,
    /// Records dropped because the saved file is gone
    pub missing: usize,
    /// Records dropped because the saved file no longer hashes to the key
    pub modified: usize,
}

/// Drop index records whose saved file is missing, and with `check_hash`
/// also those whose file content changed.
pub async fn prune_index<S>(
    store: &S,
    hasher: &PerceptualHasher,
    check_hash: bool,
) -> Result<PruneReport, StoreError>
where
    S: RecordStore + ?Sized,
{
    let mut report = PruneReport::default();

    for record in store.all().await? {
        report.checked += 1;
        let path = Path::new(&record.path);

        if !path.is_file() {
            warn!(path = %path.display(), hash = %record.hash, "Indexed file missing, dropping record");
            store.delete(&record.hash).await?;
            report.missing += 1;
        } else if check_hash && !file_matches(hasher, path, &record.hash).await {
            warn!(path = %path.display(), hash = %record.hash, "Indexed file modified, dropping record");
            store.delete(&record.hash).await?;
            report.modified += 1;
        }
    }

    info!(
        checked = report.checked,
        missing = report.missing,
        modified = report.modified,
        "Index check complete"
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) fn record(hash: &str, path: &str) -> IndexRecord {
    IndexRecord {
        hash: hash.to_string(),
        author: "author".to_string(),
        author_id: "42".to_string(),
        author_link: "https://example.com/users/42".to_string(),
        width: 64,
        height: 64,
        origin_link: "https://example.com/pixiv/1".to_string(),
        path: path.to_string(),
        size: 128,
    }
}
