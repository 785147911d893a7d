//! In-memory record store for tests and dry runs.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{IndexRecord, RecordStore, StoreError};

/// Record store held in a concurrent map; nothing survives the process.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, IndexRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn lookup(&self, hash: &str) -> Result<Option<IndexRecord>, StoreError> {
        Ok(self.records.get(hash).map(|r| r.value().clone()))
    }

    async fn insert(&self, record: &IndexRecord) -> Result<(), StoreError> {
        match self.records.entry(record.hash.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(record.hash.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(hash).is_some())
    }

    async fn all(&self) -> Result<Vec<IndexRecord>, StoreError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record;

    #[tokio::test]
    async fn test_insert_lookup_delete() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty());

        store.insert(&record("abcd", "/tmp/a.png")).await.unwrap();
        assert_eq!(
            store.lookup("abcd").await.unwrap().unwrap().path,
            "/tmp/a.png"
        );
        assert!(store.lookup("ffff").await.unwrap().is_none());

        assert!(store.delete("abcd").await.unwrap());
        assert!(!store.delete("abcd").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = MemoryRecordStore::new();
        store.insert(&record("abcd", "/tmp/a.png")).await.unwrap();

        let err = store
            .insert(&record("abcd", "/tmp/b.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(h) if h == "abcd"));
        assert_eq!(store.len(), 1);
    }
}
