//! Storage errors
//!
//! TigerStyle: Absence is not an error. `get` and `find_one` return `None`.

use crate::key::Key;
use crate::query::QueryError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends and collection drivers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A record with this primary key already exists.
    #[error("duplicate key {key} in collection {collection:?}")]
    DuplicateKey {
        /// Collection or table name
        collection: String,
        /// The taken key
        key: Key,
    },

    /// Every generated key collided.
    #[error("key generation gave up after {attempts} attempts in collection {collection:?}")]
    KeyGenerationExhausted {
        /// Collection or table name
        collection: String,
        /// Inserts tried
        attempts: u32,
    },

    /// The query could not be translated.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Could not reach the store.
    #[error("connection error: {0}")]
    Connection(String),

    /// A read failed.
    #[error("read error: {0}")]
    Read(String),

    /// A write failed.
    #[error("write error: {0}")]
    Write(String),

    /// Malformed data or a broken invariant in the store.
    #[error("internal error: {0}")]
    Internal(String),

    /// The backend cannot evaluate this filter.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// Fault injected by a simulation.
    #[error("injected fault: {0}")]
    Injected(String),
}

impl StorageError {
    /// Create a duplicate-key error.
    pub fn duplicate_key(collection: impl Into<String>, key: Key) -> Self {
        Self::DuplicateKey {
            collection: collection.into(),
            key,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }

    /// Create a write error.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// True for `DuplicateKey`.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
