//! Path operations on a JSON document tree.
//!
//! Paths are `/`-separated keys. Writing `null` deletes, and deleting the last
//! child of an object deletes the object too, so an empty node is always
//! indistinguishable from a missing one.

use serde_json::{Map, Value};
use super::StoreError;

pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() || parts.iter().any(|p| matches!(*p, "." | "..")) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

pub fn get_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.as_object()?.get(*key)).filter(|v| !v.is_null() && !v.as_object().is_some_and(Map::is_empty))
}

pub fn set_at(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = if value.is_null() { Value::Object(Map::new()) } else { value };
        return;
    };
    if value.is_null() {
        remove_at(root, path);
        return;
    }
    let mut node = root;
    for key in parents {
        if !node.is_object() { *node = Value::Object(Map::new()); }
        node = match node.as_object_mut() {
            Some(map) => map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new())),
            None => return,
        };
    }
    if !node.is_object() { *node = Value::Object(Map::new()); }
    if let Value::Object(map) = node { map.insert(last.to_string(), value); }
}

pub fn remove_at(root: &mut Value, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        *root = Value::Object(Map::new());
        return;
    };
    let Value::Object(map) = root else { return };
    if rest.is_empty() {
        map.remove(*first);
        return;
    }
    if let Some(child) = map.get_mut(*first) {
        remove_at(child, rest);
        if child.as_object().is_some_and(Map::is_empty) { map.remove(*first); }
    }
}

/// Applies each `key: value` of `partial` below `path`; keys may themselves be paths.
pub fn merge_at(root: &mut Value, path: &[&str], partial: Value) -> Result<(), StoreError> {
    let Value::Object(fields) = partial else { return Err(StoreError::NotAnObject) };
    for (key, value) in fields {
        let mut target: Vec<&str> = path.to_vec();
        target.extend(segments(&key)?);
        set_at(root, &target, value);
    }
    Ok(())
}

/// True when one path is a prefix of the other, i.e. a write to one can change the other.
pub fn overlaps(a: &[String], b: &[&str]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segments() {
        assert_eq!(segments("products/p1/quantity").unwrap(), ["products", "p1", "quantity"]);
        assert_eq!(segments("/orders/").unwrap(), ["orders"]);
        assert!(segments("").is_err());
        assert!(segments("a/../b").is_err());
    }

    #[test]
    fn test_set_and_get_nested() {
        let mut root = json!({});
        set_at(&mut root, &["products", "p1"], json!({"name": "A", "quantity": 2}));
        assert_eq!(get_at(&root, &["products", "p1", "quantity"]), Some(&json!(2)));
        assert_eq!(get_at(&root, &["products", "p2"]), None);
        assert_eq!(get_at(&root, &["products", "p1", "quantity", "deeper"]), None);
    }

    #[test]
    fn test_set_null_removes_and_prunes() {
        let mut root = json!({"users": {"u1": {"role": "admin"}}});
        set_at(&mut root, &["users", "u1", "role"], Value::Null);
        assert_eq!(root, json!({}));
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut root = json!({"a": 1});
        set_at(&mut root, &["a", "b"], json!(true));
        assert_eq!(root, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_merge_with_path_keys() {
        let mut root = json!({"products": {"p1": {"name": "A", "price": "1.00"}}});
        merge_at(&mut root, &["products"], json!({"p1/price": "2.00", "p2": {"name": "B"}})).unwrap();
        assert_eq!(root, json!({"products": {"p1": {"name": "A", "price": "2.00"}, "p2": {"name": "B"}}}));
        assert!(merge_at(&mut root, &["products"], json!([1])).is_err());
    }

    #[test]
    fn test_overlaps() {
        let watched = vec!["products".to_string()];
        assert!(overlaps(&watched, &["products", "p1"]));
        assert!(overlaps(&["products".into(), "p1".into()], &["products"]));
        assert!(!overlaps(&watched, &["orders", "o1"]));
    }
}
