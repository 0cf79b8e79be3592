//! StorageBackend - The CRUD contract
//!
//! TigerStyle: One trait, one concrete type per physical store.

use std::fmt;

use async_trait::async_trait;

use super::cursor::Cursor;
use super::error::{StorageError, StorageResult};
use super::keygen::KeyGenerator;
use crate::key::Key;
use crate::query::Query;
use crate::Record;

/// CRUD operations over one collection or table.
///
/// Implementations hold a connection/collection handle and no query state.
/// `update` on a missing key is a no-op that returns `false`.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Collection or table name, for logs.
    fn collection(&self) -> &str;

    /// Insert a new record under `key`.
    ///
    /// The primary key attribute of `record` is set to `key`, replacing
    /// any value it held.
    ///
    /// # Errors
    /// `DuplicateKey` if a record with `key` exists; nothing is written.
    async fn insert(&self, primary_name: &str, key: &Key, record: Record) -> StorageResult<()>;

    /// Merge `patch` into the record under `key`.
    ///
    /// Returns false if no record has that key.
    async fn update(&self, primary_name: &str, key: &Key, patch: Record) -> StorageResult<bool>;

    /// The record under `key`, if any.
    async fn get(&self, primary_name: &str, key: &Key) -> StorageResult<Option<Record>>;

    /// Delete every record matching all `query` units; returns how many.
    async fn remove(&self, query: &[Query]) -> StorageResult<u64>;

    /// Lazy cursor over records matching all `query` units.
    async fn find(&self, query: &[Query]) -> StorageResult<Cursor>;

    /// First record matching all `query` units, if any.
    async fn find_one(&self, query: &[Query]) -> StorageResult<Option<Record>>;

    /// Lazy cursor over every record.
    async fn find_all(&self) -> StorageResult<Cursor>;

    /// Durability barrier.
    async fn flush(&self) -> StorageResult<()>;

    /// Enforce uniqueness of `attribute`.
    async fn ensure_index(&self, _attribute: &str) -> StorageResult<()> {
        Ok(())
    }

    /// Insert under a freshly generated key, retrying on collisions.
    ///
    /// Each attempt draws a new key. Errors other than `DuplicateKey` end
    /// the loop immediately.
    ///
    /// # Errors
    /// `KeyGenerationExhausted` once `keygen.attempts_max()` attempts have
    /// all collided.
    async fn insert_generated(
        &self,
        primary_name: &str,
        record: Record,
        keygen: &KeyGenerator,
    ) -> StorageResult<Key> {
        let mut attempts: u32 = 0;

        loop {
            if keygen.attempts_max().is_some_and(|max| attempts >= max) {
                tracing::error!(
                    collection = self.collection(),
                    attempts,
                    "key generation exhausted"
                );
                return Err(StorageError::KeyGenerationExhausted {
                    collection: self.collection().to_string(),
                    attempts,
                });
            }
            attempts += 1;

            let key = keygen.generate();
            let mut candidate = record.clone();
            candidate.insert(primary_name.to_string(), key.to_value());

            match self.insert(primary_name, &key, candidate).await {
                Ok(()) => {
                    tracing::debug!(collection = self.collection(), %key, attempts, "inserted with generated key");
                    return Ok(key);
                }
                Err(e) if e.is_duplicate_key() => {
                    tracing::warn!(collection = self.collection(), %key, attempts, "generated key collided, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
