//! Quarry Core - Backend-neutral persistence with an identity map
//!
//! TigerStyle simulation-first object-document mapper.
//!
//! # Philosophy
//!
//! > "If you're not testing with fault injection, you're not testing."
//!
//! 1. Queries are data: a closed AST compiled per backend, never run
//!    directly
//! 2. Storage is a trait; every backend is tested through the same contract
//! 3. One live instance per primary key, shared through an injected map
//! 4. Seeds are logged for reproducibility
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Session                │ load/save/find     │
//! │  IdentityMap            │ one Arc per key    │
//! │  ResultSet<T>           │ lazy, hydrating    │
//! ├─────────────────────────────────────────────┤
//! │  StorageBackend         │ CRUD + keygen      │
//! │  Translator             │ Query → native     │
//! ├─────────────────────────────────────────────┤
//! │  Collection / Postgres  │ drivers            │
//! │  DST Framework          │ Fault injection    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_core::driver::MemoryCollection;
//! use quarry_core::storage::DocumentStorage;
//! use quarry_core::{IdentityMap, Key, Model, Query, Session};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<Key>,
//!     age: u32,
//! }
//!
//! impl Model for User {
//!     const NAME: &'static str = "user";
//!     fn key(&self) -> Option<Key> { self.id.clone() }
//!     fn set_key(&mut self, key: Key) { self.id = Some(key); }
//! }
//!
//! # tokio_test::block_on(async {
//! let session = Session::new(Arc::new(IdentityMap::new()));
//! session.register::<User>(Arc::new(DocumentStorage::new(MemoryCollection::new("users"))));
//!
//! let ann = session.create(User { id: None, age: 30 });
//! let key = session.save(&ann).await.unwrap();
//!
//! let adults = session.find::<User>(&[Query::new("age", "gte", 18).unwrap()]).await.unwrap();
//! assert_eq!(adults.count().await.unwrap(), 1);
//!
//! let again = session.load::<User>(key).await.unwrap().unwrap();
//! assert!(Arc::ptr_eq(&ann, &again));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backref;
pub mod config;
pub mod constants;
pub mod driver;
pub mod dst;
pub mod error;
pub mod identity;
pub mod key;
pub mod model;
pub mod query;
pub mod relation;
pub mod result_set;
pub mod session;
pub mod storage;
pub mod translate;

/// A stored record: a JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

// Re-export common types
pub use backref::BackRef;
pub use config::{ConfigError, OdmConfig};
pub use error::{OdmError, OdmResult};
pub use identity::{IdentityMap, Instance, Tracked};
pub use key::Key;
pub use model::{Cardinality, Model, Relation};
pub use query::{Condition, Group, LogicalOp, Operator, Query, QueryError};
pub use relation::{ForeignList, ForeignRef};
pub use result_set::ResultSet;
pub use session::Session;
pub use storage::{Cursor, KeyGenerator, StorageBackend, StorageError, StorageResult};
pub use translate::{DocumentTranslator, SqlTranslator, Translator};
