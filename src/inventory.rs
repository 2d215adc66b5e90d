//! Stock checks and reservations
//!
//! [`check_availability`] compares a cart against a possibly stale catalog and
//! never writes. [`StockReservations`] is what actually takes stock: each line
//! is decremented with a compare-and-set on `products/{id}/quantity`, so two
//! checkouts racing for the last unit cannot both win.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use crate::catalog::CatalogSnapshot;
use crate::domain::aggregates::CartLedger;
use crate::domain::events::{DomainEvent, EventPublisher};
use crate::store::{self, DocumentStore};
use crate::{Result, StorefrontError};

pub const DEFAULT_RETRY_LIMIT: u32 = 3;
const RELEASE_ATTEMPTS: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShortfallReason {
    /// Fewer units than requested are in stock.
    OutOfStock,
    /// Stock kept changing under concurrent checkouts until the retries ran out.
    Contended,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub product_id: String,
    pub requested: u32,
    pub available: u32,
    pub reason: ShortfallReason,
}

impl Shortfall {
    pub fn out_of_stock(product_id: impl Into<String>, requested: u32, available: u32) -> Self {
        Self { product_id: product_id.into(), requested, available, reason: ShortfallReason::OutOfStock }
    }

    pub fn contended(product_id: impl Into<String>, requested: u32, available: u32) -> Self {
        Self { product_id: product_id.into(), requested, available, reason: ShortfallReason::Contended }
    }

    pub fn missing(&self) -> u32 { self.requested.saturating_sub(self.available) }
}

/// Advisory check of every cart line against the cached stock.
/// Products no longer in the catalog count as having no stock.
pub fn check_availability(cart: &CartLedger, catalog: &CatalogSnapshot) -> std::result::Result<(), Vec<Shortfall>> {
    let shortfalls: Vec<Shortfall> = cart.items().iter().filter_map(|line| {
        let available = catalog.product(&line.product_id).map_or(0, |p| p.quantity);
        let requested = line.quantity.value();
        (requested > available).then(|| Shortfall::out_of_stock(line.product_id.clone(), requested, available))
    }).collect();
    if shortfalls.is_empty() { Ok(()) } else { Err(shortfalls) }
}

fn quantity_path(product_id: &str) -> String { format!("{}/quantity", store::product_path(product_id)) }

fn stock_of(value: Option<&Value>) -> u32 {
    value.and_then(Value::as_u64).map_or(0, |q| u32::try_from(q).unwrap_or(u32::MAX))
}

/// Stock taken for one order, to be handed back if the order is not written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reservation {
    lines: Vec<(String, u32)>,
}

impl Reservation {
    pub fn lines(&self) -> &[(String, u32)] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
}

#[derive(Clone)]
pub struct StockReservations {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
    retry_limit: u32,
}

impl StockReservations {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher, retry_limit: DEFAULT_RETRY_LIMIT }
    }

    /// Number of retries after a lost compare-and-set before giving up.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Decrements one product's stock by `quantity`, returning what is left.
    #[tracing::instrument(skip(self), fields(retry_limit = self.retry_limit))]
    pub async fn reserve(&self, product_id: &str, quantity: u32) -> Result<u32> {
        let path = quantity_path(product_id);
        let mut available = 0;
        for attempt in 0..=self.retry_limit {
            let current = self.store.get(&path).await?;
            available = stock_of(current.as_ref());
            if available < quantity { break; }
            let remaining = available - quantity;
            if self.store.compare_and_set(&path, current.as_ref(), json!(remaining)).await? {
                tracing::debug!(attempt, remaining, "stock reserved");
                self.publisher.publish(DomainEvent::StockReserved { product_id: product_id.to_string(), quantity, remaining }).await;
                return Ok(remaining);
            }
            tracing::debug!(attempt, "stock changed concurrently, retrying");
        }
        let shortfall = if available < quantity {
            tracing::info!(available, "stock reservation refused");
            Shortfall::out_of_stock(product_id, quantity, available)
        } else {
            tracing::warn!(available, "stock reservation gave up after repeated conflicts");
            Shortfall::contended(product_id, quantity, available)
        };
        Err(StorefrontError::InsufficientStock(vec![shortfall]))
    }

    /// Reserves every cart line or none: lines already taken are released when a later one fails.
    pub async fn reserve_cart(&self, cart: &CartLedger) -> Result<Reservation> {
        let mut reservation = Reservation::default();
        for line in cart.items() {
            let quantity = line.quantity.value();
            if let Err(e) = self.reserve(&line.product_id, quantity).await {
                self.release(&reservation).await;
                return Err(e);
            }
            reservation.lines.push((line.product_id.clone(), quantity));
        }
        Ok(reservation)
    }

    /// Puts reserved stock back. Failures are logged, since the caller is already unwinding.
    pub async fn release(&self, reservation: &Reservation) {
        for (product_id, quantity) in reservation.lines() {
            match self.restock(product_id, *quantity).await {
                Ok(true) => self.publisher.publish(DomainEvent::StockReleased { product_id: product_id.clone(), quantity: *quantity }).await,
                Ok(false) => tracing::error!(%product_id, quantity, "stock release kept conflicting, stock left short"),
                Err(e) => tracing::error!(%product_id, quantity, error = %e, "stock release failed"),
            }
        }
    }

    async fn restock(&self, product_id: &str, quantity: u32) -> Result<bool> {
        let path = quantity_path(product_id);
        for _ in 0..RELEASE_ATTEMPTS {
            let current = self.store.get(&path).await?;
            let restored = stock_of(current.as_ref()).saturating_add(quantity);
            if self.store.compare_and_set(&path, current.as_ref(), json!(restored)).await? { return Ok(true); }
        }
        Ok(false)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use crate::store::{DocumentStore, MemoryStore, StoreError, Subscription};

    /// Lets another "shopper" take one unit right before each of the first
    /// `steals` compare-and-set calls, so those calls lose the race.
    pub struct ContendedStore {
        pub inner: MemoryStore,
        pub steals: AtomicU32,
    }

    impl ContendedStore {
        pub fn new(inner: MemoryStore, steals: u32) -> Self { Self { inner, steals: AtomicU32::new(steals) } }
    }

    #[async_trait]
    impl DocumentStore for ContendedStore {
        async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> { self.inner.get(path).await }
        async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> { self.inner.set(path, value).await }
        async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> { self.inner.update(path, partial).await }
        async fn remove(&self, path: &str) -> Result<(), StoreError> { self.inner.remove(path).await }
        async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> { self.inner.subscribe(path).await }

        async fn compare_and_set(&self, path: &str, expected: Option<&Value>, new: Value) -> Result<bool, StoreError> {
            if self.steals.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                let stock = self.inner.get(path).await?.and_then(|v| v.as_u64()).unwrap_or(0);
                self.inner.set(path, serde_json::json!(stock.saturating_sub(1))).await?;
            }
            self.inner.compare_and_set(path, expected, new).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ContendedStore;
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::domain::events::testing::RecordingPublisher;
    use crate::domain::value_objects::Money;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn product(id: &str, stock: u32) -> Product {
        Product {
            id: id.into(), name: id.into(), category: "Toys & Games".into(), price: Money::new(Decimal::new(500, 2)).unwrap(),
            quantity: stock, description: String::new(), image: String::new(),
        }
    }

    fn store_with(stock: &[(&str, u32)]) -> MemoryStore {
        let products: serde_json::Map<String, Value> = stock.iter().map(|(id, q)| (id.to_string(), product(id, *q).to_record())).collect();
        MemoryStore::with_tree(json!({ "products": products }))
    }

    async fn stock(store: &dyn DocumentStore, id: &str) -> u32 { stock_of(store.get(&quantity_path(id)).await.unwrap().as_ref()) }

    #[test]
    fn test_check_availability() {
        let catalog = CatalogSnapshot::new(vec![product("p1", 2), product("p2", 5)], vec![]);
        let mut cart = CartLedger::new();
        cart.add_item(&product("p1", 9), 3).unwrap();
        cart.add_item(&product("p2", 9), 5).unwrap();
        cart.add_item(&product("gone", 9), 1).unwrap();
        let shortfalls = check_availability(&cart, &catalog).unwrap_err();
        assert_eq!(shortfalls, vec![
            Shortfall::out_of_stock("p1", 3, 2),
            Shortfall::out_of_stock("gone", 1, 0),
        ]);
        assert_eq!(shortfalls[0].missing(), 1);
        cart.remove_item("gone");
        cart.update_quantity("p1", 2).unwrap();
        assert!(check_availability(&cart, &catalog).is_ok());
    }

    #[tokio::test]
    async fn test_reserve_decrements_stock() {
        let store = Arc::new(store_with(&[("p1", 5)]));
        let publisher = Arc::new(RecordingPublisher::default());
        let stock_reservations = StockReservations::new(store.clone(), publisher.clone());
        assert_eq!(stock_reservations.reserve("p1", 2).await.unwrap(), 3);
        assert_eq!(stock(store.as_ref(), "p1").await, 3);
        assert_eq!(publisher.kinds(), ["stock.reserved"]);
    }

    #[tokio::test]
    async fn test_reserve_refuses_oversell() {
        let store = Arc::new(store_with(&[("p1", 1)]));
        let stock_reservations = StockReservations::new(store.clone(), Arc::new(RecordingPublisher::default()));
        let err = stock_reservations.reserve("p1", 2).await.unwrap_err();
        let StorefrontError::InsufficientStock(shortfalls) = err else { panic!("expected shortfall") };
        assert_eq!(shortfalls[0].available, 1);
        assert_eq!(shortfalls[0].reason, ShortfallReason::OutOfStock);
        assert_eq!(stock(store.as_ref(), "p1").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_for_last_unit() {
        let store = Arc::new(store_with(&[("p1", 1)]));
        let stock_reservations = StockReservations::new(store.clone(), Arc::new(RecordingPublisher::default()));
        let (a, b) = tokio::join!(stock_reservations.reserve("p1", 1), stock_reservations.reserve("p1", 1));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(stock(store.as_ref(), "p1").await, 0);
    }

    #[tokio::test]
    async fn test_lost_race_is_retried() {
        let store = Arc::new(ContendedStore::new(store_with(&[("p1", 5)]), 2));
        let stock_reservations = StockReservations::new(store.clone(), Arc::new(RecordingPublisher::default()));
        assert_eq!(stock_reservations.reserve("p1", 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_insufficient_stock() {
        let store = Arc::new(ContendedStore::new(store_with(&[("p1", 10)]), 10));
        let stock_reservations = StockReservations::new(store.clone(), Arc::new(RecordingPublisher::default())).with_retry_limit(1);
        let err = stock_reservations.reserve("p1", 1).await.unwrap_err();
        assert!(err.to_string().contains("kept changing"), "{err}");
        let StorefrontError::InsufficientStock(shortfalls) = err else { panic!("expected shortfall") };
        assert_eq!(shortfalls[0].reason, ShortfallReason::Contended);
        assert!(shortfalls[0].available >= shortfalls[0].requested);
        assert_eq!(stock(store.as_ref(), "p1").await, 8);
    }

    #[tokio::test]
    async fn test_reserve_cart_rolls_back_on_shortfall() {
        let store = Arc::new(store_with(&[("p1", 5), ("p2", 1)]));
        let publisher = Arc::new(RecordingPublisher::default());
        let stock_reservations = StockReservations::new(store.clone(), publisher.clone());
        let mut cart = CartLedger::new();
        cart.add_item(&product("p1", 5), 2).unwrap();
        cart.add_item(&product("p2", 5), 3).unwrap();
        assert!(stock_reservations.reserve_cart(&cart).await.is_err());
        assert_eq!(stock(store.as_ref(), "p1").await, 5);
        assert_eq!(stock(store.as_ref(), "p2").await, 1);
        assert_eq!(publisher.kinds(), ["stock.reserved", "stock.released"]);
    }

    #[tokio::test]
    async fn test_release_restores_stock() {
        let store = Arc::new(store_with(&[("p1", 4)]));
        let stock_reservations = StockReservations::new(store.clone(), Arc::new(RecordingPublisher::default()));
        let mut cart = CartLedger::new();
        cart.add_item(&product("p1", 4), 3).unwrap();
        let reservation = stock_reservations.reserve_cart(&cart).await.unwrap();
        assert_eq!(reservation.lines(), &[("p1".to_string(), 3)]);
        assert_eq!(stock(store.as_ref(), "p1").await, 1);
        stock_reservations.release(&reservation).await;
        assert_eq!(stock(store.as_ref(), "p1").await, 4);
    }
}
