//! Driver - Physical collection handles
//!
//! A driver is the connection/collection object a document-store backend is
//! built on. The storage layer only needs the primitives below; sorting,
//! skipping and limiting travel in a [`CursorWindow`].

mod matcher;
mod memory;

pub use matcher::{compare_values, matches};
pub use memory::MemoryCollection;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::storage::{CursorWindow, StorageResult};
use crate::Record;

/// Native primitives of a document collection.
///
/// Filters are documents in the `$`-operator dialect produced by
/// [`DocumentTranslator`](crate::translate::DocumentTranslator).
#[async_trait]
pub trait Collection: Send + Sync + fmt::Debug {
    /// Collection name.
    fn name(&self) -> &str;

    /// Reject future inserts that repeat a value of `attribute`. Idempotent.
    async fn create_unique_index(&self, attribute: &str) -> StorageResult<()>;

    /// Insert one document.
    ///
    /// Fails with `DuplicateKey` on a unique-index violation.
    async fn insert_one(&self, document: Record) -> StorageResult<()>;

    /// Documents matching `filter`, inside `window`.
    async fn find(&self, filter: &Value, window: &CursorWindow) -> StorageResult<Vec<Record>>;

    /// Number of documents matching `filter`, inside `window`.
    async fn count(&self, filter: &Value, window: &CursorWindow) -> StorageResult<u64>;

    /// Merge `patch` into the first document matching `filter`.
    ///
    /// Returns false if nothing matched.
    async fn update_one(&self, filter: &Value, patch: &Record) -> StorageResult<bool>;

    /// Delete every document matching `filter`; returns how many.
    async fn delete_many(&self, filter: &Value) -> StorageResult<u64>;
}
