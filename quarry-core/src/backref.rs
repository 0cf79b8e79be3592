//! Back-references - The inverse side of a relationship
//!
//! Stored on the referenced record under `__backrefs`:
//!
//! ```text
//! {backref_name: {owner_type: {owner_field: [owner keys]}}}
//! ```

use serde_json::{Map, Value};

use crate::key::Key;
use crate::model::{Cardinality, Relation};
use crate::Record;

/// One owner pointing at a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackRef {
    /// `Model::NAME` of the owner
    pub owner_type: String,
    /// Owner attribute holding the reference
    pub field: String,
    /// Owner primary key
    pub key: Key,
}

/// The `__backrefs` object of one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BackRefs(Map<String, Value>);

impl BackRefs {
    /// Read from a stored value, ignoring anything malformed.
    pub(crate) fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self(map.clone()),
            _ => Self::default(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    fn keys_mut(&mut self, name: &str, owner_type: &str, field: &str) -> &mut Vec<Value> {
        let types = object_entry(&mut self.0, name);
        let fields = object_entry(types, owner_type);
        let keys = fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !keys.is_array() {
            *keys = Value::Array(Vec::new());
        }
        match keys {
            Value::Array(keys) => keys,
            _ => unreachable!("normalized to an array above"),
        }
    }

    /// Record `owner` under `name`. Returns false if already present.
    pub(crate) fn add(&mut self, name: &str, owner_type: &str, field: &str, owner: &Key) -> bool {
        let keys = self.keys_mut(name, owner_type, field);
        let owner = owner.to_value();
        if keys.contains(&owner) {
            return false;
        }
        keys.push(owner);
        true
    }

    /// Forget `owner` under `name`. Returns false if it was not present.
    pub(crate) fn remove(&mut self, name: &str, owner_type: &str, field: &str, owner: &Key) -> bool {
        let keys = self.keys_mut(name, owner_type, field);
        let owner = owner.to_value();
        let before = keys.len();
        keys.retain(|k| k != &owner);
        keys.len() != before
    }

    /// Every owner listed under `name`.
    pub(crate) fn list(&self, name: &str) -> Vec<BackRef> {
        let mut found = Vec::new();
        let Some(Value::Object(types)) = self.0.get(name) else {
            return found;
        };
        for (owner_type, fields) in types {
            let Value::Object(fields) = fields else {
                continue;
            };
            for (field, keys) in fields {
                let Value::Array(keys) = keys else {
                    continue;
                };
                found.extend(keys.iter().filter_map(Key::from_value).map(|key| BackRef {
                    owner_type: owner_type.clone(),
                    field: field.clone(),
                    key,
                }));
            }
        }
        found
    }
}

fn object_entry<'a>(map: &'a mut Map<String, Value>, name: &str) -> &'a mut Map<String, Value> {
    let entry = map
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(inner) => inner,
        _ => unreachable!("normalized to an object above"),
    }
}

/// Keys a relation field holds in `record`, in stored order.
pub(crate) fn relation_keys(record: &Record, relation: &Relation) -> Vec<Key> {
    match (record.get(relation.field), relation.cardinality) {
        (None | Some(Value::Null), _) => Vec::new(),
        (Some(Value::Array(keys)), Cardinality::Many) => {
            keys.iter().filter_map(Key::from_value).collect()
        }
        (Some(value), _) => Key::from_value(value).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_remove_list() {
        let mut refs = BackRefs::default();
        assert!(refs.add("posts", "post", "tags", &Key::from("p1")));
        assert!(refs.add("posts", "post", "tags", &Key::from("p2")));
        assert!(!refs.add("posts", "post", "tags", &Key::from("p1")));

        assert_eq!(
            refs.to_value(),
            json!({"posts": {"post": {"tags": ["p1", "p2"]}}})
        );

        assert!(refs.remove("posts", "post", "tags", &Key::from("p1")));
        assert!(!refs.remove("posts", "post", "tags", &Key::from("p1")));

        let listed = refs.list("posts");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, Key::from("p2"));
        assert_eq!(listed[0].owner_type, "post");
        assert!(refs.list("comments").is_empty());
    }

    #[test]
    fn test_malformed_stored_value_is_ignored() {
        let refs = BackRefs::from_value(Some(&json!("garbage")));
        assert!(refs.list("posts").is_empty());

        let mut refs = BackRefs::from_value(Some(&json!({"posts": 3})));
        assert!(refs.add("posts", "post", "tags", &Key::Int(1)));
        assert_eq!(refs.list("posts").len(), 1);
    }

    #[test]
    fn test_relation_keys() {
        let many = Relation::many("tags", "tag");
        let one = Relation::one("author", "user");
        let record = match json!({"tags": ["a", 2], "author": "u1", "none": null}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(relation_keys(&record, &many), vec![Key::from("a"), Key::Int(2)]);
        assert_eq!(relation_keys(&record, &one), vec![Key::from("u1")]);
        assert!(relation_keys(&record, &Relation::one("none", "user")).is_empty());
        assert!(relation_keys(&record, &Relation::one("missing", "user")).is_empty());
    }
}
