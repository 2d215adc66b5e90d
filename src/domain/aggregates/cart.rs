//! Cart Ledger
//!
//! A shopper's selected line items in insertion order. Quantities are absolute:
//! adding a product that is already present replaces its quantity.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLedger {
    items: Vec<CartLineItem>,
}

/// Snapshot of a product taken when it was added to the cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: String,
    pub name: String,
    pub price: Money,
    pub image: String,
    pub quantity: Quantity,
    /// Stock the product had when the line was last set from the catalog.
    pub available: u32,
}

impl CartLineItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity.value()) }
}

impl CartLedger {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartLineItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn unit_count(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn get(&self, product_id: &str) -> Option<&CartLineItem> { self.items.iter().find(|i| i.product_id == product_id) }

    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        let quantity = Quantity::new(quantity).map_err(|_| CartError::InvalidQuantity)?;
        if quantity.value() > product.quantity {
            return Err(CartError::InsufficientStock { product_id: product.id.clone(), requested: quantity.value(), available: product.quantity });
        }
        let line = CartLineItem {
            product_id: product.id.clone(), name: product.name.clone(), price: product.price,
            image: product.image.clone(), quantity, available: product.quantity,
        };
        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => *existing = line,
            None => self.items.push(line),
        }
        Ok(())
    }

    /// Sets the quantity of a line already in the cart.
    ///
    /// A zero quantity or an unknown product leaves the cart untouched. A
    /// quantity above the stock seen at add-time is refused.
    pub fn update_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        let Ok(quantity) = Quantity::new(quantity) else { return Ok(()) };
        let Some(item) = self.items.iter_mut().find(|i| i.product_id == product_id) else { return Ok(()) };
        if quantity.value() > item.available {
            return Err(CartError::InsufficientStock { product_id: product_id.to_string(), requested: quantity.value(), available: item.available });
        }
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) { self.items.retain(|i| i.product_id != product_id); }

    pub fn clear(&mut self) { self.items.clear(); }

    pub fn total(&self) -> Money { self.items.iter().map(CartLineItem::line_total).sum() }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("only {available} of {product_id} available, {requested} requested")]
    InsufficientStock { product_id: String, requested: u32, available: u32 },
}
