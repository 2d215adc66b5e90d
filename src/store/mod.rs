//! Document Store
//!
//! Hierarchical key-value persistence addressed by `/`-separated paths
//! (`products/{id}`, `categories/{id}`, `orders/{id}`, `users/{uid}`). Reading
//! a path returns everything below it; `compare_and_set` is the one primitive
//! with atomic read-check-write semantics and is what stock reservation is
//! built on.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::watch;

pub mod memory;
pub mod postgres;
pub mod tree;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

pub const PRODUCTS: &str = "products";
pub const CATEGORIES: &str = "categories";
pub const ORDERS: &str = "orders";
pub const USERS: &str = "users";
pub const CREDENTIALS: &str = "credentials";

pub fn product_path(id: &str) -> String { format!("{PRODUCTS}/{id}") }
pub fn category_path(id: &str) -> String { format!("{CATEGORIES}/{id}") }
pub fn order_path(id: &str) -> String { format!("{ORDERS}/{id}") }
pub fn user_path(uid: &str) -> String { format!("{USERS}/{uid}") }

/// Last segment of a path, i.e. the generated key returned inside `push`'s path.
pub fn key_of(path: &str) -> &str { path.rsplit('/').next().unwrap_or(path) }

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    #[error("partial update must be an object")]
    NotAnObject,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Value at `path` including all children, `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value at `path`. Writing `null` removes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Writes each key of `partial` below `path`, leaving siblings untouched.
    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError>;

    /// Reserves a new time-ordered child key under `path` and returns its full path.
    /// Nothing is written until the caller sets a value there.
    async fn push(&self, path: &str) -> Result<String, StoreError> {
        tree::segments(path)?;
        Ok(format!("{}/{}", path.trim_end_matches('/'), uuid::Uuid::now_v7().simple()))
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Writes `new` only if the current value equals `expected` (`None` = absent).
    /// Returns whether the write happened.
    async fn compare_and_set(&self, path: &str, expected: Option<&Value>, new: Value) -> Result<bool, StoreError>;

    /// Follows `path`: the handle yields the full value there after every change.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}

/// Live view of one path. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    path: String,
    rx: watch::Receiver<Option<Value>>,
}

impl Subscription {
    pub fn path(&self) -> &str { &self.path }

    pub fn current(&self) -> Option<Value> { self.rx.borrow().clone() }

    /// Waits for the next change and returns the new value. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Option<Value>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Subscriber registry shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct Watchers {
    entries: Mutex<Vec<(Vec<String>, watch::Sender<Option<Value>>)>>,
}

impl Watchers {
    pub fn register(&self, path: &str, current: Option<Value>) -> Result<Subscription, StoreError> {
        let segments = tree::segments(path)?.into_iter().map(String::from).collect();
        let (tx, rx) = watch::channel(current);
        self.lock().push((segments, tx));
        Ok(Subscription { path: path.to_string(), rx })
    }

    /// Pushes fresh values to every subscriber whose path overlaps `changed`.
    /// `root` holds the tree found at `root_path`; watched paths are resolved below it.
    pub fn notify(&self, root: &Value, root_path: &[&str], changed: &[&str]) {
        let mut entries = self.lock();
        entries.retain(|(_, tx)| !tx.is_closed());
        for (watched, tx) in entries.iter() {
            if !tree::overlaps(watched, changed) || watched.len() < root_path.len() { continue; }
            let (prefix, relative) = watched.split_at(root_path.len());
            if !tree::overlaps(prefix, root_path) { continue; }
            let relative: Vec<&str> = relative.iter().map(String::as_str).collect();
            let _ = tx.send(tree::get_at(root, &relative).cloned());
        }
    }

    /// True when a live subscriber watches a path shorter than `depth` that overlaps `changed`.
    pub fn watches_above(&self, depth: usize, changed: &[&str]) -> bool {
        self.lock().iter().any(|(watched, tx)| watched.len() < depth && !tx.is_closed() && tree::overlaps(watched, changed))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Vec<String>, watch::Sender<Option<Value>>)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
