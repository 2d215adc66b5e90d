//! Order Assembler and order history
//!
//! Assembling an order reserves stock for every line, then writes the fully
//! built order to `orders/{id}` in a single `set`. If that write fails the
//! reservation is handed back, so a failed placement leaves neither an order
//! nor missing stock behind.

use std::sync::Arc;
use validator::Validate;
use crate::domain::aggregates::{parse_collection, CartLedger, Order, ShippingAddress};
use crate::domain::events::{DomainEvent, EventPublisher};
use crate::domain::value_objects::PaymentSelection;
use crate::inventory::StockReservations;
use crate::store::{self, DocumentStore, ORDERS};
use crate::{Result, StorefrontError};

#[derive(Clone)]
pub struct OrderAssembler {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
    stock: StockReservations,
}

impl OrderAssembler {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        let stock = StockReservations::new(store.clone(), publisher.clone());
        Self { store, publisher, stock }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.stock = self.stock.with_retry_limit(retry_limit);
        self
    }

    /// Turns the cart into a persisted pending order owned by `user_id`.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, lines = cart.item_count()))]
    pub async fn assemble(&self, cart: &CartLedger, shipping: ShippingAddress, payment: &PaymentSelection, user_id: &str) -> Result<Order> {
        shipping.validate()?;
        payment.validate()?;
        let path = self.store.push(ORDERS).await.map_err(StorefrontError::OrderPersistence)?;
        let order = Order::from_cart(store::key_of(&path), cart, shipping, payment.redact(), user_id)?;

        let reservation = self.stock.reserve_cart(cart).await.map_err(|e| match e {
            StorefrontError::Store(e) => StorefrontError::OrderPersistence(e),
            other => other,
        })?;
        if let Err(e) = self.store.set(&path, order.to_record()).await {
            tracing::error!(order_id = %order.id, error = %e, "order write failed, releasing stock");
            self.stock.release(&reservation).await;
            return Err(StorefrontError::OrderPersistence(e));
        }

        tracing::info!(order_id = %order.id, total = %order.total, "order placed");
        self.publisher.publish(DomainEvent::OrderPlaced { order_id: order.id.clone(), user_id: order.user_id.clone(), total: order.total.amount() }).await;
        Ok(order)
    }

    pub async fn load_order(&self, id: &str) -> Result<Order> {
        let record = self.store.get(&store::order_path(id)).await?.ok_or_else(|| StorefrontError::NotFound(format!("Order {id}")))?;
        Ok(Order::from_record(id, record)?)
    }

    /// Every order, oldest first.
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        Ok(parse_collection(self.store.get(ORDERS).await?, Order::from_record)?)
    }

    /// The user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.all_orders().await?.into_iter().filter(|o| o.user_id == user_id).collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(orders)
    }
}
