//! Domain events
//!
//! Published after the state change they describe has been written. Delivery
//! is best-effort: a publisher that fails only logs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    OrderPlaced { order_id: String, user_id: String, total: Decimal },
    #[serde(rename_all = "camelCase")]
    StockReserved { product_id: String, quantity: u32, remaining: u32 },
    #[serde(rename_all = "camelCase")]
    StockReleased { product_id: String, quantity: u32 },
    #[serde(rename_all = "camelCase")]
    ProductSaved { product_id: String },
    #[serde(rename_all = "camelCase")]
    ProductDeleted { product_id: String },
    #[serde(rename_all = "camelCase")]
    CategorySaved { category_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    CategoryDeleted { category_id: String },
}

impl DomainEvent {
    /// Subject suffix, e.g. `orders.placed`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "orders.placed",
            Self::StockReserved { .. } => "stock.reserved",
            Self::StockReleased { .. } => "stock.released",
            Self::ProductSaved { .. } => "products.saved",
            Self::ProductDeleted { .. } => "products.deleted",
            Self::CategorySaved { .. } => "categories.saved",
            Self::CategoryDeleted { .. } => "categories.deleted",
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Writes events to the trace log only.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: DomainEvent) {
        tracing::debug!(kind = event.kind(), ?event, "domain event");
    }
}

/// Publishes each event as JSON on `storefront.<kind>`.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: DomainEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => { tracing::warn!(error = %e, kind = event.kind(), "event not serializable"); return; }
        };
        if let Err(e) = self.client.publish(format!("storefront.{}", event.kind()), payload.into()).await {
            tracing::warn!(error = %e, kind = event.kind(), "event publish failed");
        }
    }
}
