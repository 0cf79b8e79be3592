//! Session errors

use crate::key::Key;
use crate::storage::StorageError;

/// Result type for session and identity map operations.
pub type OdmResult<T> = Result<T, OdmError>;

/// Errors raised above the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum OdmError {
    /// Backend failure, passed through unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No storage was registered for this model.
    #[error("model {0:?} is not registered with this session")]
    UnregisteredModel(String),

    /// A record could not be converted to or from a model.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A model serialized to something other than an object.
    #[error("{type_name} does not serialize to a record")]
    NotARecord {
        /// `Model::NAME`
        type_name: String,
    },

    /// A record or instance has no usable primary key.
    #[error("{type_name} has no primary key {primary_name:?}")]
    MissingKey {
        /// `Model::NAME`
        type_name: String,
        /// Primary key attribute
        primary_name: String,
    },

    /// Raised only by `load_required`.
    #[error("{type_name} {key} not found")]
    NotFound {
        /// `Model::NAME`
        type_name: String,
        /// Requested key
        key: Key,
    },

    /// The cached instance under this key belongs to another Rust type.
    #[error("cached {type_name} {key} has a different Rust type")]
    TypeMismatch {
        /// `Model::NAME`
        type_name: String,
        /// Cached key
        key: Key,
    },
}

impl OdmError {
    /// Create a missing-key error.
    pub fn missing_key(type_name: &str, primary_name: &str) -> Self {
        Self::MissingKey {
            type_name: type_name.to_string(),
            primary_name: primary_name.to_string(),
        }
    }

    /// True if the underlying storage error is `DuplicateKey`.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_duplicate_key())
    }
}
