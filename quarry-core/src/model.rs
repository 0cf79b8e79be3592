//! Model - What the session needs to know about a record type
//!
//! Field declarations and validation live with the type itself; serde does
//! the record conversion.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::PRIMARY_NAME_DEFAULT;
use crate::key::Key;

/// How many records a relationship field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Stored as one key
    One,
    /// Stored as an array of keys
    Many,
}

/// A relationship field of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Attribute holding the key(s)
    pub field: &'static str,
    /// `Model::NAME` of the referenced type
    pub target: &'static str,
    /// One key or many
    pub cardinality: Cardinality,
    /// Name under which the referenced record lists its owners
    pub backref: Option<&'static str>,
}

impl Relation {
    /// A to-one relationship without a back-reference.
    #[must_use]
    pub const fn one(field: &'static str, target: &'static str) -> Self {
        Self {
            field,
            target,
            cardinality: Cardinality::One,
            backref: None,
        }
    }

    /// A to-many relationship without a back-reference.
    #[must_use]
    pub const fn many(field: &'static str, target: &'static str) -> Self {
        Self {
            field,
            target,
            cardinality: Cardinality::Many,
            backref: None,
        }
    }

    /// Maintain a back-reference named `name` on the referenced records.
    #[must_use]
    pub const fn with_backref(mut self, name: &'static str) -> Self {
        self.backref = Some(name);
        self
    }
}

/// A persistent record type.
///
/// The serde form is the stored record. It must include the primary key
/// attribute once a key is assigned, and must tolerate the reserved
/// `__backrefs` attribute being absent.
///
/// # Example
///
/// ```
/// use quarry_core::{ForeignList, Key, Model, Relation};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Tag {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<Key>,
///     label: String,
/// }
///
/// impl Model for Tag {
///     const NAME: &'static str = "tag";
///     fn key(&self) -> Option<Key> { self.id.clone() }
///     fn set_key(&mut self, key: Key) { self.id = Some(key); }
/// }
///
/// #[derive(Serialize, Deserialize)]
/// struct Post {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<Key>,
///     tags: ForeignList<Tag>,
/// }
///
/// impl Model for Post {
///     const NAME: &'static str = "post";
///     fn key(&self) -> Option<Key> { self.id.clone() }
///     fn set_key(&mut self, key: Key) { self.id = Some(key); }
///     fn relations() -> &'static [Relation] {
///         const RELATIONS: &[Relation] = &[Relation::many("tags", "tag").with_backref("posts")];
///         RELATIONS
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name, used as the identity map namespace and in back-references.
    const NAME: &'static str;

    /// Primary key attribute.
    fn primary_name() -> &'static str {
        PRIMARY_NAME_DEFAULT
    }

    /// Primary key, once assigned.
    fn key(&self) -> Option<Key>;

    /// Assign the primary key.
    fn set_key(&mut self, key: Key);

    /// Relationship fields.
    fn relations() -> &'static [Relation] {
        &[]
    }
}
