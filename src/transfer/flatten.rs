//! Flattening of nested documents into path-keyed records and back
//!
//! `flatten` turns `{"address": {"city": "London"}}` into
//! `{"address.city": "London"}`; `unflatten` rebuilds the nesting. Both are
//! pure functions over any [`KeyValueTree`], so the same code serves BSON
//! documents and JSON objects.
//!
//! Sequences are never expanded into indexed keys; they travel as opaque
//! values. The mapping is only reversible when no original key contains the
//! separator and no nested mapping is empty. Both situations are recorded in
//! a [`FlattenReport`] instead of being dropped silently, as is a path that
//! lands on a key already taken (`{"a": {"b": 1}, "a.b": 2}`), where the
//! first value wins.

use std::fmt;

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value as JsonValue};

/// Separator used when none is configured.
pub const DEFAULT_SEPARATOR: &str = ".";

/// A string-keyed, insertion-ordered tree whose values may be nested trees.
pub trait KeyValueTree: Default {
    /// Value stored under a key: a scalar, a sequence or a nested tree.
    type Value;

    /// Number of entries at this level.
    fn len(&self) -> usize;

    /// Whether this level has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the tree, yielding entries in insertion order.
    fn into_entries(self) -> Vec<(String, Self::Value)>;

    /// Insert or replace an entry.
    fn insert_entry(&mut self, key: String, value: Self::Value);

    /// Mutable access to an entry.
    fn entry_mut(&mut self, key: &str) -> Option<&mut Self::Value>;

    /// Unwrap a value holding a nested tree; any other value is handed back.
    fn into_subtree(value: Self::Value) -> std::result::Result<Self, Self::Value>;

    /// Mutable access to the nested tree held by a value.
    fn subtree_mut(value: &mut Self::Value) -> Option<&mut Self>;

    /// Wrap a tree as a value.
    fn from_subtree(tree: Self) -> Self::Value;
}

impl KeyValueTree for Document {
    type Value = Bson;

    fn len(&self) -> usize {
        Document::len(self)
    }

    fn into_entries(self) -> Vec<(String, Bson)> {
        self.into_iter().collect()
    }

    fn insert_entry(&mut self, key: String, value: Bson) {
        self.insert(key, value);
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.get_mut(key)
    }

    fn into_subtree(value: Bson) -> std::result::Result<Self, Bson> {
        match value {
            Bson::Document(doc) => Ok(doc),
            other => Err(other),
        }
    }

    fn subtree_mut(value: &mut Bson) -> Option<&mut Self> {
        match value {
            Bson::Document(doc) => Some(doc),
            _ => None,
        }
    }

    fn from_subtree(tree: Self) -> Bson {
        Bson::Document(tree)
    }
}

impl KeyValueTree for Map<String, JsonValue> {
    type Value = JsonValue;

    fn len(&self) -> usize {
        Map::len(self)
    }

    fn into_entries(self) -> Vec<(String, JsonValue)> {
        self.into_iter().collect()
    }

    fn insert_entry(&mut self, key: String, value: JsonValue) {
        self.insert(key, value);
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut JsonValue> {
        self.get_mut(key)
    }

    fn into_subtree(value: JsonValue) -> std::result::Result<Self, JsonValue> {
        match value {
            JsonValue::Object(map) => Ok(map),
            other => Err(other),
        }
    }

    fn subtree_mut(value: &mut JsonValue) -> Option<&mut Self> {
        match value {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }
    }

    fn from_subtree(tree: Self) -> JsonValue {
        JsonValue::Object(tree)
    }
}

/// Lossy spots found while flattening one record.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlattenReport {
    /// Paths of empty nested mappings, which produce no keys.
    pub dropped_empty: Vec<String>,
    /// Paths whose own key contains the separator and cannot be restored.
    pub ambiguous_keys: Vec<String>,
    /// Flat keys produced twice; the later value is dropped.
    pub collisions: Vec<String>,
}

impl FlattenReport {
    /// Whether flattening lost nothing.
    pub fn is_lossless(&self) -> bool {
        self.dropped_empty.is_empty()
            && self.ambiguous_keys.is_empty()
            && self.collisions.is_empty()
    }
}

/// A flat key whose path runs through an existing value of a different shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureConflict {
    /// The flat key being placed.
    pub key: String,
    /// The path at which a scalar and a nested document collide.
    pub path: String,
}

impl fmt::Display for StructureConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Structure conflict placing '{}': '{}' is both a value and a nested document",
            self.key, self.path
        )
    }
}

impl std::error::Error for StructureConflict {}

/// Flatten a nested tree into path-keyed entries.
pub fn flatten<T: KeyValueTree>(tree: T, separator: &str) -> T {
    flatten_with_report(tree, separator).0
}

/// Flatten a nested tree and report what could not be represented.
pub fn flatten_with_report<T: KeyValueTree>(tree: T, separator: &str) -> (T, FlattenReport) {
    debug_assert!(!separator.is_empty(), "separator must not be empty");

    let mut flat = T::default();
    let mut report = FlattenReport::default();
    flatten_into(&mut flat, None, tree, separator, &mut report);
    (flat, report)
}

fn flatten_into<T: KeyValueTree>(
    flat: &mut T,
    prefix: Option<&str>,
    tree: T,
    separator: &str,
    report: &mut FlattenReport,
) {
    for (key, value) in tree.into_entries() {
        let ambiguous = key.contains(separator);
        let path = match prefix {
            Some(prefix) => format!("{prefix}{separator}{key}"),
            None => key,
        };
        if ambiguous {
            report.ambiguous_keys.push(path.clone());
        }

        match T::into_subtree(value) {
            Ok(subtree) if subtree.is_empty() => report.dropped_empty.push(path),
            Ok(subtree) => flatten_into(flat, Some(&path), subtree, separator, report),
            Err(_) if flat.entry_mut(&path).is_some() => report.collisions.push(path),
            Err(leaf) => flat.insert_entry(path, leaf),
        }
    }
}

/// Rebuild nesting from path-keyed entries.
///
/// Values that are already nested trees are merged with sibling paths that
/// share their prefix. A path that needs a nested document where a scalar
/// already sits (or the reverse) fails with [`StructureConflict`].
pub fn unflatten<T: KeyValueTree>(
    record: T,
    separator: &str,
) -> std::result::Result<T, StructureConflict> {
    debug_assert!(!separator.is_empty(), "separator must not be empty");

    let mut root = T::default();

    for (key, value) in record.into_entries() {
        let segments: Vec<&str> = key.split(separator).collect();
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };

        let mut node = &mut root;
        for (depth, segment) in parents.iter().enumerate() {
            if node.entry_mut(segment).is_none() {
                node.insert_entry(segment.to_string(), T::from_subtree(T::default()));
            }
            node = match node.entry_mut(segment).and_then(T::subtree_mut) {
                Some(child) => child,
                None => {
                    return Err(StructureConflict {
                        path: segments[..=depth].join(separator),
                        key,
                    });
                }
            };
        }

        place(node, leaf, value, &key, &key, separator)?;
    }

    Ok(root)
}

/// Put `value` under `leaf`, merging nested trees that meet at the same path.
fn place<T: KeyValueTree>(
    node: &mut T,
    leaf: &str,
    value: T::Value,
    key: &str,
    path: &str,
    separator: &str,
) -> std::result::Result<(), StructureConflict> {
    let Some(existing) = node.entry_mut(leaf) else {
        node.insert_entry(leaf.to_string(), value);
        return Ok(());
    };

    let conflict = || StructureConflict {
        key: key.to_string(),
        path: path.to_string(),
    };

    let target = T::subtree_mut(existing).ok_or_else(conflict)?;
    let incoming = T::into_subtree(value).map_err(|_| conflict())?;

    for (child_key, child_value) in incoming.into_entries() {
        let child_path = format!("{path}{separator}{child_key}");
        place(target, &child_key, child_value, key, &child_path, separator)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};
    use serde_json::json;

    #[test]
    fn test_flatten_nested_address() {
        let doc = doc! {
            "address": { "city": "London", "country": "GB" },
            "name": "x",
        };

        let flat = flatten(doc.clone(), ".");
        assert_eq!(
            flat,
            doc! { "address.city": "London", "address.country": "GB", "name": "x" }
        );
        assert_eq!(unflatten(flat, ".").unwrap(), doc);
    }

    #[test]
    fn test_flatten_preserves_first_seen_order() {
        let doc = doc! { "z": 1, "a": { "y": 2, "b": 3 }, "m": 4 };
        let flat = flatten(doc, ".");
        let keys: Vec<&String> = flat.keys().collect();
        assert_eq!(keys, vec!["z", "a.y", "a.b", "m"]);
    }

    #[test]
    fn test_flatten_keeps_sequences_opaque() {
        let doc = doc! {
            "tags": ["a", "b"],
            "items": [{ "sku": 1 }, { "sku": 2 }],
        };

        let flat = flatten(doc.clone(), ".");
        assert_eq!(flat, doc);
    }

    #[test]
    fn test_flatten_drops_empty_mapping_and_reports_it() {
        let doc = doc! { "a": 1, "meta": {}, "deep": { "inner": {} } };

        let (flat, report) = flatten_with_report(doc, ".");
        assert_eq!(flat, doc! { "a": 1 });
        assert!(flat.keys().all(|k| !k.starts_with("meta")));
        assert_eq!(report.dropped_empty, vec!["meta", "deep.inner"]);
        assert!(!report.is_lossless());
    }

    #[test]
    fn test_flatten_reports_keys_containing_separator() {
        let doc = doc! { "outer": { "v1.2": true } };

        let (flat, report) = flatten_with_report(doc, ".");
        assert_eq!(flat, doc! { "outer.v1.2": true });
        assert_eq!(report.ambiguous_keys, vec!["outer.v1.2"]);
    }

    #[test]
    fn test_colliding_paths_keep_first_value_and_report() {
        let doc = doc! { "a": { "b": 1 }, "a.b": 2, "c": 3 };

        let (flat, report) = flatten_with_report(doc, ".");
        assert_eq!(flat, doc! { "a.b": 1, "c": 3 });
        assert_eq!(report.collisions, vec!["a.b"]);
        assert_eq!(report.ambiguous_keys, vec!["a.b"]);
        assert!(!report.is_lossless());
    }

    #[test]
    fn test_json_collision_is_reported() {
        let JsonValue::Object(map) = json!({ "x.y": "first", "x": { "y": "second" } }) else {
            unreachable!()
        };

        let (flat, report) = flatten_with_report(map, ".");
        assert_eq!(flat.get("x.y"), Some(&json!("first")));
        assert_eq!(report.collisions, vec!["x.y"]);
    }

    #[test]
    fn test_custom_separator() {
        let doc = doc! { "a": { "b.c": 1, "d": { "e": "x" } } };

        let flat = flatten(doc.clone(), "__");
        assert_eq!(flat, doc! { "a__b.c": 1, "a__d__e": "x" });
        assert_eq!(unflatten(flat, "__").unwrap(), doc);
    }

    #[test]
    fn test_round_trip_with_database_types() {
        let oid = ObjectId::new();
        let doc = doc! {
            "ref": oid,
            "when": mongodb::bson::DateTime::from_millis(1_700_000_000_000),
            "stats": { "count": 3_i64, "ratio": 0.5, "ok": true, "none": null },
            "list": [1, 2, 3],
        };

        let flat = flatten(doc.clone(), ".");
        assert_eq!(unflatten(flat, ".").unwrap(), doc);
    }

    #[test]
    fn test_unflatten_scalar_then_nested_conflicts() {
        let record = doc! { "a": 1, "a.b": 2 };

        let err = unflatten(record, ".").unwrap_err();
        assert_eq!(err.key, "a.b");
        assert_eq!(err.path, "a");
    }

    #[test]
    fn test_unflatten_nested_then_scalar_conflicts() {
        let record = doc! { "a.b": 2, "a": 1 };

        let err = unflatten(record, ".").unwrap_err();
        assert_eq!(err.key, "a");
        assert_eq!(err.path, "a");
    }

    #[test]
    fn test_unflatten_deeper_conflict_reports_path() {
        let record = doc! { "a.b": "leaf", "a.b.c": 1 };

        let err = unflatten(record, ".").unwrap_err();
        assert_eq!(err.path, "a.b");
        assert!(err.to_string().contains("'a.b'"));
    }

    #[test]
    fn test_unflatten_merges_nested_values_sharing_prefix() {
        let record = doc! { "a.x": 1, "a": { "y": 2 } };

        let nested = unflatten(record, ".").unwrap();
        assert_eq!(nested, doc! { "a": { "x": 1, "y": 2 } });
    }

    #[test]
    fn test_unflatten_merge_with_overlapping_scalar_conflicts() {
        let record = doc! { "a.x": 1, "a": { "x": 2 } };

        let err = unflatten(record, ".").unwrap_err();
        assert_eq!(err.path, "a.x");
    }

    #[test]
    fn test_json_object_round_trip() {
        let value = json!({
            "user": { "name": "ada", "langs": ["en", "fr"] },
            "active": true
        });
        let JsonValue::Object(map) = value.clone() else {
            unreachable!()
        };

        let flat = flatten(map, ".");
        assert_eq!(flat.get("user.name"), Some(&json!("ada")));
        assert_eq!(flat.get("user.langs"), Some(&json!(["en", "fr"])));

        let restored = unflatten(flat, ".").unwrap();
        assert_eq!(JsonValue::Object(restored), value);
    }

    #[test]
    fn test_empty_document() {
        let (flat, report) = flatten_with_report(Document::new(), ".");
        assert!(flat.is_empty());
        assert!(report.is_lossless());
        assert!(unflatten(Document::new(), ".").unwrap().is_empty());
    }
}
