//! Catalog Cache
//!
//! Read-only view of `products` and `categories`, fetched lazily on first use
//! and dropped again whenever an admin write (or a watched change) invalidates
//! it. A failed load never poisons the cache: callers get an empty snapshot
//! carrying the error and the next call fetches again.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use crate::domain::aggregates::{parse_collection, Category, Product, RecordError, ALL_CATEGORIES};
use crate::store::{DocumentStore, StoreError, CATEGORIES, PRODUCTS};

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("catalog unavailable: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Malformed(#[from] RecordError),
}

#[derive(Clone, Debug, Default)]
pub struct CatalogSnapshot {
    products: Vec<Product>,
    categories: Vec<Category>,
    load_error: Option<String>,
}

impl CatalogSnapshot {
    pub fn new(products: Vec<Product>, categories: Vec<Category>) -> Self {
        Self { products, categories, load_error: None }
    }

    /// Empty catalog standing in for one that could not be loaded.
    pub fn degraded(error: &CatalogLoadError) -> Self {
        Self { load_error: Some(error.to_string()), ..Self::default() }
    }

    pub fn products(&self) -> &[Product] { &self.products }
    pub fn categories(&self) -> &[Category] { &self.categories }
    pub fn load_error(&self) -> Option<&str> { self.load_error.as_deref() }

    pub fn product(&self, id: &str) -> Option<&Product> { self.products.iter().find(|p| p.id == id) }

    pub fn has_category(&self, name: &str) -> bool { self.categories.iter().any(|c| c.name == name) }

    /// Products whose category equals `name`, or every product for `"all"`.
    pub fn filter_by_category(&self, name: &str) -> Vec<&Product> {
        if name == ALL_CATEGORIES { return self.products.iter().collect(); }
        self.products.iter().filter(|p| p.category == name).collect()
    }
}

pub async fn load_catalog(store: &dyn DocumentStore) -> Result<CatalogSnapshot, CatalogLoadError> {
    let products = parse_collection(store.get(PRODUCTS).await?, Product::from_record)?;
    let categories = parse_collection(store.get(CATEGORIES).await?, Category::from_record)?;
    Ok(CatalogSnapshot::new(products, categories))
}

pub struct CatalogCache {
    store: Arc<dyn DocumentStore>,
    current: RwLock<Cached>,
}

/// Cached snapshot plus a generation that every invalidation bumps, so a load
/// that started before an invalidation never lands in the cache.
#[derive(Default)]
struct Cached {
    generation: u64,
    snapshot: Option<Arc<CatalogSnapshot>>,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store, current: RwLock::default() } }

    /// The cached snapshot, loading it first if needed. Load failures yield a degraded snapshot.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        if let Some(snapshot) = self.current.read().await.snapshot.as_ref() { return snapshot.clone(); }
        match self.refresh().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "catalog load failed, serving empty catalog");
                Arc::new(CatalogSnapshot::degraded(&e))
            }
        }
    }

    /// Fetches the catalog again and caches it, unless the cache was
    /// invalidated while the load was in flight.
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>, CatalogLoadError> {
        let generation = self.current.read().await.generation;
        let snapshot = Arc::new(load_catalog(self.store.as_ref()).await?);
        let mut cached = self.current.write().await;
        if cached.generation == generation {
            tracing::debug!(products = snapshot.products.len(), categories = snapshot.categories.len(), "catalog loaded");
            cached.snapshot = Some(snapshot.clone());
        } else {
            tracing::debug!("catalog changed during load, not caching");
        }
        Ok(snapshot)
    }

    pub async fn invalidate(&self) {
        let mut cached = self.current.write().await;
        cached.generation += 1;
        cached.snapshot = None;
    }

    /// Invalidates the cache whenever products or categories change in the store.
    pub async fn watch(self: &Arc<Self>) -> Result<CatalogWatch, StoreError> {
        let mut products = self.store.subscribe(PRODUCTS).await?;
        let mut categories = self.store.subscribe(CATEGORIES).await?;
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    change = products.changed() => change.map(|_| PRODUCTS),
                    change = categories.changed() => change.map(|_| CATEGORIES),
                };
                let Some(collection) = changed else { break };
                tracing::debug!(collection, "catalog changed, invalidating cache");
                cache.invalidate().await;
            }
        });
        Ok(CatalogWatch { handle })
    }
}

/// Listener started by [`CatalogCache::watch`]; stops when dropped.
#[derive(Debug)]
pub struct CatalogWatch {
    handle: JoinHandle<()>,
}

impl Drop for CatalogWatch {
    fn drop(&mut self) { self.handle.abort(); }
}
