//! DocumentStorage - Backend over a document collection driver
//!
//! TigerStyle: Translate, then delegate. The driver owns the data; this
//! type owns nothing but the handle and the index bookkeeping.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::backend::StorageBackend;
use super::cursor::{Cursor, CursorWindow, RecordSource};
use super::error::StorageResult;
use crate::driver::Collection;
use crate::key::Key;
use crate::query::Query;
use crate::translate::{DocumentTranslator, Translator};
use crate::Record;

/// Storage backend for MongoDB-style collections.
#[derive(Debug)]
pub struct DocumentStorage<C> {
    collection: Arc<C>,
    translator: DocumentTranslator,
    indexed: Mutex<HashSet<String>>,
}

impl<C: Collection + 'static> DocumentStorage<C> {
    /// Wrap a collection handle.
    #[must_use]
    pub fn new(collection: C) -> Self {
        Self::from_arc(Arc::new(collection))
    }

    /// Wrap a shared collection handle.
    #[must_use]
    pub fn from_arc(collection: Arc<C>) -> Self {
        Self {
            collection,
            translator: DocumentTranslator::new(),
            indexed: Mutex::new(HashSet::new()),
        }
    }

    /// The underlying collection.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.collection
    }

    fn key_filter(primary_name: &str, key: &Key) -> Value {
        let mut filter = Map::new();
        filter.insert(primary_name.to_string(), key.to_value());
        Value::Object(filter)
    }

    fn cursor(&self, filter: Value) -> Cursor {
        Cursor::new(Arc::new(CollectionSource {
            collection: Arc::clone(&self.collection),
            filter,
        }))
    }

    fn is_indexed(&self, attribute: &str) -> bool {
        self.indexed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(attribute)
    }
}

#[async_trait]
impl<C: Collection + 'static> StorageBackend for DocumentStorage<C> {
    fn collection(&self) -> &str {
        self.collection.name()
    }

    async fn ensure_index(&self, attribute: &str) -> StorageResult<()> {
        if self.is_indexed(attribute) {
            return Ok(());
        }
        self.collection.create_unique_index(attribute).await?;
        self.indexed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(attribute.to_string());
        tracing::debug!(collection = self.collection.name(), attribute, "unique index ensured");
        Ok(())
    }

    async fn insert(&self, primary_name: &str, key: &Key, mut record: Record) -> StorageResult<()> {
        self.ensure_index(primary_name).await?;
        record.insert(primary_name.to_string(), key.to_value());
        self.collection.insert_one(record).await
    }

    async fn update(&self, primary_name: &str, key: &Key, patch: Record) -> StorageResult<bool> {
        self.collection
            .update_one(&Self::key_filter(primary_name, key), &patch)
            .await
    }

    async fn get(&self, primary_name: &str, key: &Key) -> StorageResult<Option<Record>> {
        let window = CursorWindow {
            limit: Some(1),
            ..CursorWindow::default()
        };
        let mut found = self
            .collection
            .find(&Self::key_filter(primary_name, key), &window)
            .await?;
        Ok(found.pop())
    }

    async fn remove(&self, query: &[Query]) -> StorageResult<u64> {
        let filter = self.translator.translate_all(query)?;
        let removed = self.collection.delete_many(&filter).await?;
        tracing::debug!(collection = self.collection.name(), removed, "removed records");
        Ok(removed)
    }

    async fn find(&self, query: &[Query]) -> StorageResult<Cursor> {
        let filter = self.translator.translate_all(query)?;
        Ok(self.cursor(filter))
    }

    async fn find_one(&self, query: &[Query]) -> StorageResult<Option<Record>> {
        let cursor = self.find(query).await?;
        cursor.nth(0).await
    }

    async fn find_all(&self) -> StorageResult<Cursor> {
        Ok(self.cursor(self.translator.match_all()))
    }

    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

// =============================================================================
// Record Source
// =============================================================================

/// A translated filter bound to its collection.
#[derive(Debug)]
struct CollectionSource<C> {
    collection: Arc<C>,
    filter: Value,
}

#[async_trait]
impl<C: Collection + 'static> RecordSource for CollectionSource<C> {
    async fn fetch(&self, window: &CursorWindow) -> StorageResult<Vec<Record>> {
        self.collection.find(&self.filter, window).await
    }

    async fn count(&self, window: &CursorWindow) -> StorageResult<u64> {
        self.collection.count(&self.filter, window).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryCollection;
    use crate::storage::{KeyGenerator, StorageError};
    use crate::dst::DeterministicRng;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    async fn seeded() -> DocumentStorage<MemoryCollection> {
        let storage = DocumentStorage::new(MemoryCollection::new("users"));
        for (id, name, age) in [(1, "ann", 30), (2, "bob", 17), (3, "cy", 45)] {
            storage
                .insert("_id", &Key::Int(id), record(json!({"name": name, "age": age})))
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_insert_adds_primary_key() {
        let storage = seeded().await;
        let ann = storage.get("_id", &Key::Int(1)).await.unwrap().unwrap();
        assert_eq!(ann["_id"], json!(1));
        assert_eq!(ann["name"], json!("ann"));
        assert!(storage.get("_id", &Key::Int(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_key_wins_over_record_primary() {
        let storage = DocumentStorage::new(MemoryCollection::new("users"));
        storage
            .insert("_id", &Key::Int(5), record(json!({"_id": 9, "name": "eve"})))
            .await
            .unwrap();

        let eve = storage.get("_id", &Key::Int(5)).await.unwrap().unwrap();
        assert_eq!(eve["_id"], json!(5));
        assert_eq!(eve["name"], json!("eve"));
        assert!(storage.get("_id", &Key::Int(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_writes_nothing() {
        let storage = seeded().await;
        let err = storage
            .insert("_id", &Key::Int(2), record(json!({"name": "impostor"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        let bob = storage.get("_id", &Key::Int(2)).await.unwrap().unwrap();
        assert_eq!(bob["name"], json!("bob"));
    }

    #[tokio::test]
    async fn test_update_missing_is_noop() {
        let storage = seeded().await;
        assert!(storage
            .update("_id", &Key::Int(1), record(json!({"age": 31})))
            .await
            .unwrap());
        assert!(!storage
            .update("_id", &Key::Int(42), record(json!({"age": 31})))
            .await
            .unwrap());
        assert_eq!(storage.inner().len().await, 3);
    }

    #[tokio::test]
    async fn test_find_and_remove() {
        let storage = seeded().await;
        let adults = vec![Query::new("age", "gte", 18).unwrap()];

        let cursor = storage.find(&adults).await.unwrap().sort(&["-age"]).unwrap();
        assert_eq!(cursor.count().await.unwrap(), 2);
        let first = cursor.nth(0).await.unwrap().unwrap();
        assert_eq!(first["name"], json!("cy"));

        let one = storage
            .find_one(&[Query::eq("name", "bob")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(one["age"], json!(17));

        assert_eq!(storage.remove(&adults).await.unwrap(), 2);
        assert_eq!(storage.find_all().await.unwrap().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_without_units_removes_everything() {
        let storage = seeded().await;
        assert_eq!(storage.remove(&[]).await.unwrap(), 3);
        assert!(storage.inner().is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_generated() {
        let storage = DocumentStorage::new(MemoryCollection::new("notes"));
        let keygen = KeyGenerator::with_rng(5, Some(3), DeterministicRng::new(7));

        let key = storage
            .insert_generated("_id", record(json!({"text": "hi"})), &keygen)
            .await
            .unwrap();
        let stored = storage.get("_id", &key).await.unwrap().unwrap();
        assert_eq!(stored["text"], json!("hi"));
        assert_eq!(stored["_id"], key.to_value());
    }
}
