//! Relationship fields
//!
//! A relationship stores keys, never embedded records. Resolving goes
//! through the session's identity map, so a referenced record is fetched at
//! most once and only when asked for.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::OdmResult;
use crate::identity::Instance;
use crate::key::Key;
use crate::model::Model;
use crate::session::Session;

// =============================================================================
// ForeignRef
// =============================================================================

/// To-one relationship, stored as the referenced key.
pub struct ForeignRef<T> {
    key: Key,
    _target: PhantomData<fn() -> T>,
}

impl<T> ForeignRef<T> {
    /// Refer to the record under `key`.
    pub fn new(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            _target: PhantomData,
        }
    }

    /// The referenced key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl<T: Model> ForeignRef<T> {
    /// Load the referenced instance.
    ///
    /// # Errors
    /// Storage or deserialization errors. A dangling key is `Ok(None)`.
    pub async fn resolve(&self, session: &Session) -> OdmResult<Option<Instance<T>>> {
        session.load::<T>(self.key.clone()).await
    }
}

impl<T> Clone for ForeignRef<T> {
    fn clone(&self) -> Self {
        Self::new(self.key.clone())
    }
}

impl<T> PartialEq for ForeignRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for ForeignRef<T> {}

impl<T> fmt::Debug for ForeignRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignRef").field(&self.key).finish()
    }
}

impl<T> Serialize for ForeignRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.key.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for ForeignRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Key::deserialize(deserializer).map(Self::new)
    }
}

// =============================================================================
// ForeignList
// =============================================================================

/// To-many relationship, stored as an array of keys.
pub struct ForeignList<T> {
    keys: Vec<Key>,
    _target: PhantomData<fn() -> T>,
}

impl<T> ForeignList<T> {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::from_keys(Vec::new())
    }

    /// List over existing keys, dropping repeats.
    #[must_use]
    pub fn from_keys(keys: Vec<Key>) -> Self {
        let mut list = Self {
            keys: Vec::with_capacity(keys.len()),
            _target: PhantomData,
        };
        for key in keys {
            list.attach(key);
        }
        list
    }

    /// Add a key. Returns false if it was already attached.
    pub fn attach(&mut self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Remove a key. Returns false if it was not attached.
    pub fn detach(&mut self, key: &Key) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k != key);
        self.keys.len() != before
    }

    /// Attached keys, in attach order.
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// True if `key` is attached.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.keys.contains(key)
    }

    /// Number of attached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<T: Model> ForeignList<T> {
    /// Load every referenced instance, in attach order. Dangling keys are
    /// skipped.
    ///
    /// # Errors
    /// Storage or deserialization errors.
    pub async fn resolve(&self, session: &Session) -> OdmResult<Vec<Instance<T>>> {
        let mut resolved = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            match session.load::<T>(key.clone()).await? {
                Some(instance) => resolved.push(instance),
                None => tracing::warn!(model = T::NAME, %key, "dangling relationship key"),
            }
        }
        Ok(resolved)
    }
}

impl<T> Default for ForeignList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ForeignList<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for ForeignList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl<T> fmt::Debug for ForeignList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignList").field(&self.keys).finish()
    }
}

impl<T> Serialize for ForeignList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for ForeignList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Key>::deserialize(deserializer).map(Self::from_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Tag;

    #[test]
    fn test_foreign_ref_serializes_as_key() {
        let r: ForeignRef<Tag> = ForeignRef::new("t1");
        assert_eq!(serde_json::to_value(&r).unwrap(), json!("t1"));

        let back: ForeignRef<Tag> = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(back.key(), &Key::Int(7));
    }

    #[test]
    fn test_foreign_list_attach_detach() {
        let mut list: ForeignList<Tag> = ForeignList::new();
        assert!(list.attach("a"));
        assert!(list.attach("b"));
        assert!(!list.attach("a"));
        assert_eq!(list.len(), 2);

        assert!(list.detach(&Key::from("a")));
        assert!(!list.detach(&Key::from("a")));
        assert_eq!(list.keys(), &[Key::from("b")]);
    }

    #[test]
    fn test_foreign_list_serde() {
        let list: ForeignList<Tag> = serde_json::from_value(json!(["a", 2, "a"])).unwrap();
        assert_eq!(list.keys(), &[Key::from("a"), Key::Int(2)]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!(["a", 2]));
    }
}
