//! Shared models and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::driver::MemoryCollection;
use quarry_core::storage::{Cursor, DocumentStorage, Instrumented, StorageBackend, StorageResult};
use quarry_core::{
    ForeignList, ForeignRef, IdentityMap, Key, Model, Query, Record, Relation, Session,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Backend = Instrumented<DocumentStorage<MemoryCollection>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Key>,
    pub name: String,
    pub age: u32,
}

impl Model for User {
    const NAME: &'static str = "user";

    fn key(&self) -> Option<Key> {
        self.id.clone()
    }

    fn set_key(&mut self, key: Key) {
        self.id = Some(key);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Key>,
    pub label: String,
}

impl Model for Tag {
    const NAME: &'static str = "tag";

    fn key(&self) -> Option<Key> {
        self.id.clone()
    }

    fn set_key(&mut self, key: Key) {
        self.id = Some(key);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Key>,
    pub title: String,
    #[serde(default)]
    pub tags: ForeignList<Tag>,
    #[serde(default)]
    pub author: Option<ForeignRef<User>>,
}

impl Model for Post {
    const NAME: &'static str = "post";

    fn key(&self) -> Option<Key> {
        self.id.clone()
    }

    fn set_key(&mut self, key: Key) {
        self.id = Some(key);
    }

    fn relations() -> &'static [Relation] {
        const RELATIONS: &[Relation] = &[
            Relation::many("tags", "tag").with_backref("posts"),
            Relation::one("author", "user"),
        ];
        RELATIONS
    }
}

impl Post {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            tags: ForeignList::new(),
            author: None,
        }
    }
}

/// A session with one instrumented in-memory backend per model.
pub struct World {
    pub session: Session,
    pub users: Arc<Backend>,
    pub tags: Arc<Backend>,
    pub posts: Arc<Backend>,
}

impl World {
    /// Zero every backend's counters.
    pub fn reset_stats(&self) {
        self.users.stats().reset();
        self.tags.stats().reset();
        self.posts.stats().reset();
    }
}

pub fn backend(name: &str) -> Arc<Backend> {
    Arc::new(Instrumented::new(DocumentStorage::new(MemoryCollection::new(name))))
}

pub fn world() -> World {
    world_with(backend("users"), backend("tags"), backend("posts"))
}

/// A session over the given backends.
pub fn world_with(users: Arc<Backend>, tags: Arc<Backend>, posts: Arc<Backend>) -> World {
    init_logging();

    let session = Session::new(Arc::new(IdentityMap::new()));
    session.register::<User>(users.clone());
    session.register::<Tag>(tags.clone());
    session.register::<Post>(posts.clone());

    World {
        session,
        users,
        tags,
        posts,
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record must be an object, got {other}"),
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quarry_core=debug")
        .with_test_writer()
        .try_init();
}

/// Forwards every call to `S` after yielding to the scheduler, so that
/// concurrent saves interleave at each storage round trip.
#[derive(Debug)]
pub struct Yielding<S>(pub S);

#[async_trait]
impl<S: StorageBackend> StorageBackend for Yielding<S> {
    fn collection(&self) -> &str {
        self.0.collection()
    }

    async fn insert(&self, primary_name: &str, key: &Key, record: Record) -> StorageResult<()> {
        tokio::task::yield_now().await;
        self.0.insert(primary_name, key, record).await
    }

    async fn update(&self, primary_name: &str, key: &Key, patch: Record) -> StorageResult<bool> {
        tokio::task::yield_now().await;
        self.0.update(primary_name, key, patch).await
    }

    async fn get(&self, primary_name: &str, key: &Key) -> StorageResult<Option<Record>> {
        tokio::task::yield_now().await;
        self.0.get(primary_name, key).await
    }

    async fn remove(&self, query: &[Query]) -> StorageResult<u64> {
        tokio::task::yield_now().await;
        self.0.remove(query).await
    }

    async fn find(&self, query: &[Query]) -> StorageResult<Cursor> {
        tokio::task::yield_now().await;
        self.0.find(query).await
    }

    async fn find_one(&self, query: &[Query]) -> StorageResult<Option<Record>> {
        tokio::task::yield_now().await;
        self.0.find_one(query).await
    }

    async fn find_all(&self) -> StorageResult<Cursor> {
        tokio::task::yield_now().await;
        self.0.find_all().await
    }

    async fn flush(&self) -> StorageResult<()> {
        self.0.flush().await
    }

    async fn ensure_index(&self, attribute: &str) -> StorageResult<()> {
        self.0.ensure_index(attribute).await
    }
}
