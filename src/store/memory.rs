//! In-process Document Store holding the whole tree behind one lock.
//!
//! The lock is never held across an await, so every operation, including
//! compare-and-set, is applied atomically.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use super::{tree, DocumentStore, StoreError, Subscription, Watchers};

#[derive(Debug)]
pub struct MemoryStore {
    root: Mutex<Value>,
    watchers: Watchers,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self { Self::with_tree(Value::Object(Map::new())) }

    pub fn with_tree(root: Value) -> Self { Self { root: Mutex::new(root), watchers: Watchers::default() } }

    fn lock(&self) -> MutexGuard<'_, Value> { self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) }

    fn write<T>(&self, path: &str, apply: impl FnOnce(&mut Value, &[&str]) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let segments = tree::segments(path)?;
        let mut root = self.lock();
        let out = apply(&mut *root, &segments)?;
        self.watchers.notify(&root, &[], &segments);
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = tree::segments(path)?;
        Ok(tree::get_at(&self.lock(), &segments).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.write(path, |root, at| { tree::set_at(root, at, value); Ok(()) })
    }

    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        self.write(path, |root, at| tree::merge_at(root, at, partial))
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.write(path, |root, at| { tree::remove_at(root, at); Ok(()) })
    }

    async fn compare_and_set(&self, path: &str, expected: Option<&Value>, new: Value) -> Result<bool, StoreError> {
        let segments = tree::segments(path)?;
        let mut root = self.lock();
        if tree::get_at(&root, &segments) != expected { return Ok(false); }
        tree::set_at(&mut root, &segments, new);
        self.watchers.notify(&root, &[], &segments);
        Ok(true)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let segments = tree::segments(path)?;
        let current = tree::get_at(&self.lock(), &segments).cloned();
        self.watchers.register(path, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("products/p1", json!({"name": "A", "quantity": 3})).await.unwrap();
        assert_eq!(store.get("products/p1/quantity").await.unwrap(), Some(json!(3)));
        assert_eq!(store.get("products").await.unwrap(), Some(json!({"p1": {"name": "A", "quantity": 3}})));
        store.remove("products/p1").await.unwrap();
        assert_eq!(store.get("products").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_keeps_siblings() {
        let store = MemoryStore::new();
        store.set("products/p1", json!({"name": "A", "quantity": 3})).await.unwrap();
        store.update("products/p1", json!({"quantity": 1})).await.unwrap();
        assert_eq!(store.get("products/p1").await.unwrap(), Some(json!({"name": "A", "quantity": 1})));
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = MemoryStore::new();
        store.set("products/p1/quantity", json!(1)).await.unwrap();
        assert!(!store.compare_and_set("products/p1/quantity", Some(&json!(2)), json!(0)).await.unwrap());
        assert!(store.compare_and_set("products/p1/quantity", Some(&json!(1)), json!(0)).await.unwrap());
        assert_eq!(store.get("products/p1/quantity").await.unwrap(), Some(json!(0)));
        assert!(store.compare_and_set("orders/o1", None, json!({"total": "1"})).await.unwrap());
        assert!(!store.compare_and_set("orders/o1", None, json!({"total": "2"})).await.unwrap());
    }

    #[tokio::test]
    async fn test_subscription_sees_child_writes() {
        let store = MemoryStore::new();
        store.set("products/p1", json!({"name": "A"})).await.unwrap();
        let mut sub = store.subscribe("products").await.unwrap();
        assert_eq!(sub.path(), "products");
        assert_eq!(sub.current(), Some(json!({"p1": {"name": "A"}})));
        store.set("products/p2", json!({"name": "B"})).await.unwrap();
        assert_eq!(sub.changed().await, Some(Some(json!({"p1": {"name": "A"}, "p2": {"name": "B"}}))));
    }

    #[tokio::test]
    async fn test_subscription_ignores_unrelated_paths() {
        let store = MemoryStore::new();
        let sub = store.subscribe("products").await.unwrap();
        store.set("orders/o1", json!({"total": "1"})).await.unwrap();
        assert!(!sub.rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = MemoryStore::new();
        drop(store.subscribe("products").await.unwrap());
        store.set("products/p1", json!({"name": "A"})).await.unwrap();
        assert!(store.watchers.lock().is_empty());
    }
}
