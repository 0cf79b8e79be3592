//! Instrumented - Logging and call counting around any backend
//!
//! TigerStyle: Observation only. The wrapped backend sees exactly the calls
//! the caller made, in the same order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Level;

use super::backend::StorageBackend;
use super::cursor::Cursor;
use super::error::StorageResult;
use crate::key::Key;
use crate::query::Query;
use crate::Record;

/// A backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `get`
    Get,
    /// `remove`
    Remove,
    /// `find`
    Find,
    /// `find_one`
    FindOne,
    /// `find_all`
    FindAll,
    /// `flush`
    Flush,
}

impl Op {
    /// Every operation, in counter order.
    pub const ALL: [Op; 8] = [
        Op::Insert,
        Op::Update,
        Op::Get,
        Op::Remove,
        Op::Find,
        Op::FindOne,
        Op::FindAll,
        Op::Flush,
    ];

    /// Operation name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Insert => "insert",
            Op::Update => "update",
            Op::Get => "get",
            Op::Remove => "remove",
            Op::Find => "find",
            Op::FindOne => "find_one",
            Op::FindAll => "find_all",
            Op::Flush => "flush",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct OpStats {
    calls: [AtomicU64; 8],
    failures: [AtomicU64; 8],
}

impl OpStats {
    /// Calls made to `op`, successful or not.
    #[must_use]
    pub fn calls(&self, op: Op) -> u64 {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Calls to `op` that returned an error.
    #[must_use]
    pub fn failures(&self, op: Op) -> u64 {
        self.failures[op.index()].load(Ordering::SeqCst)
    }

    /// Calls across all operations.
    #[must_use]
    pub fn total(&self) -> u64 {
        Op::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in self.calls.iter().chain(self.failures.iter()) {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

/// Wraps a backend, logging every call and counting it in [`OpStats`].
#[derive(Debug)]
pub struct Instrumented<S> {
    inner: S,
    level: Option<Level>,
    stats: OpStats,
}

impl<S: StorageBackend> Instrumented<S> {
    /// Wrap `inner`, logging calls at DEBUG.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            level: Some(Level::DEBUG),
            stats: OpStats::default(),
        }
    }

    /// Log at `level`, or not at all with `None`. Counting is unaffected.
    #[must_use]
    pub fn with_level(mut self, level: Option<Level>) -> Self {
        self.level = level;
        self
    }

    /// Call counters.
    #[must_use]
    pub fn stats(&self) -> &OpStats {
        &self.stats
    }

    /// The wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn observe<T, F>(&self, op: Op, call: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>> + Send,
        T: Send,
    {
        self.stats.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let result = call.await;
        if result.is_err() {
            self.stats.failures[op.index()].fetch_add(1, Ordering::SeqCst);
        }
        self.log(op, start.elapsed(), result.is_ok());
        result
    }

    fn log(&self, op: Op, elapsed: Duration, ok: bool) {
        let Some(level) = self.level else {
            return;
        };
        let collection = self.inner.collection();
        let op = op.as_str();
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        if level == Level::ERROR {
            tracing::error!(collection, op, micros, ok, "storage call");
        } else if level == Level::WARN {
            tracing::warn!(collection, op, micros, ok, "storage call");
        } else if level == Level::INFO {
            tracing::info!(collection, op, micros, ok, "storage call");
        } else if level == Level::DEBUG {
            tracing::debug!(collection, op, micros, ok, "storage call");
        } else {
            tracing::trace!(collection, op, micros, ok, "storage call");
        }
    }
}

#[async_trait]
impl<S: StorageBackend> StorageBackend for Instrumented<S> {
    fn collection(&self) -> &str {
        self.inner.collection()
    }

    async fn insert(&self, primary_name: &str, key: &Key, record: Record) -> StorageResult<()> {
        self.observe(Op::Insert, self.inner.insert(primary_name, key, record))
            .await
    }

    async fn update(&self, primary_name: &str, key: &Key, patch: Record) -> StorageResult<bool> {
        self.observe(Op::Update, self.inner.update(primary_name, key, patch))
            .await
    }

    async fn get(&self, primary_name: &str, key: &Key) -> StorageResult<Option<Record>> {
        self.observe(Op::Get, self.inner.get(primary_name, key)).await
    }

    async fn remove(&self, query: &[Query]) -> StorageResult<u64> {
        self.observe(Op::Remove, self.inner.remove(query)).await
    }

    async fn find(&self, query: &[Query]) -> StorageResult<Cursor> {
        self.observe(Op::Find, self.inner.find(query)).await
    }

    async fn find_one(&self, query: &[Query]) -> StorageResult<Option<Record>> {
        self.observe(Op::FindOne, self.inner.find_one(query)).await
    }

    async fn find_all(&self) -> StorageResult<Cursor> {
        self.observe(Op::FindAll, self.inner.find_all()).await
    }

    async fn flush(&self) -> StorageResult<()> {
        self.observe(Op::Flush, self.inner.flush()).await
    }

    async fn ensure_index(&self, attribute: &str) -> StorageResult<()> {
        self.inner.ensure_index(attribute).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryCollection;
    use crate::dst::DeterministicRng;
    use crate::storage::{DocumentStorage, KeyGenerator};
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    #[tokio::test]
    async fn test_counts_each_call() {
        let storage = Instrumented::new(DocumentStorage::new(MemoryCollection::new("items")));

        storage
            .insert("_id", &Key::Int(1), record(json!({"n": 1})))
            .await
            .unwrap();
        storage.get("_id", &Key::Int(1)).await.unwrap();
        storage.get("_id", &Key::Int(2)).await.unwrap();
        let _ = storage
            .insert("_id", &Key::Int(1), record(json!({"n": 2})))
            .await;

        assert_eq!(storage.stats().calls(Op::Insert), 2);
        assert_eq!(storage.stats().failures(Op::Insert), 1);
        assert_eq!(storage.stats().calls(Op::Get), 2);
        assert_eq!(storage.stats().calls(Op::Update), 0);
        assert_eq!(storage.stats().total(), 4);

        storage.stats().reset();
        assert_eq!(storage.stats().total(), 0);
    }

    #[tokio::test]
    async fn test_generated_insert_counts_attempts() {
        let storage = Instrumented::new(DocumentStorage::new(MemoryCollection::new("items")))
            .with_level(None);
        let keygen = KeyGenerator::with_rng(5, None, DeterministicRng::new(3));

        storage
            .insert_generated("_id", record(json!({"n": 1})), &keygen)
            .await
            .unwrap();
        assert_eq!(storage.stats().calls(Op::Insert), 1);
    }
}
