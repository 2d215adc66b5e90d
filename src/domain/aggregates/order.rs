//! Order Aggregate
//!
//! An order is a snapshot: line names and prices are copied out of the cart
//! when it is assembled and never looked up again.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};
use crate::domain::aggregates::cart::CartLedger;
use crate::domain::aggregates::product::RecordError;
use crate::domain::value_objects::{field_error, Money, PaymentSummary, Quantity};

static ZIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").expect("static pattern"));

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip)]
    pub id: String,
    pub items: Vec<OrderLine>,
    pub total: Money,
    pub shipping: ShippingAddress,
    pub payment: PaymentSummary,
    pub user_id: String,
    pub status: OrderStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub name: String,
    pub quantity: Quantity,
    pub price: Money,
}

impl OrderLine {
    pub fn subtotal(&self) -> Money { self.price.multiply(self.quantity.value()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Completed, Cancelled }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(custom = "first_name_rule")]
    pub first_name: String,
    #[validate(custom = "last_name_rule")]
    pub last_name: String,
    #[validate(custom = "street_rule")]
    pub address: String,
    #[validate(custom = "city_rule")]
    pub city: String,
    #[validate(custom = "state_rule")]
    pub state: String,
    #[validate(custom = "zip_rule")]
    pub zip: String,
    #[validate(custom = "phone_rule")]
    pub phone: String,
}

impl Order {
    /// Captures the cart into a pending order. Fails only when the cart is empty.
    pub fn from_cart(id: impl Into<String>, cart: &CartLedger, shipping: ShippingAddress, payment: PaymentSummary, user_id: impl Into<String>) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::NoItems); }
        let items: Vec<OrderLine> = cart.items().iter().map(|line| OrderLine {
            product_id: line.product_id.clone(), name: line.name.clone(), quantity: line.quantity, price: line.price,
        }).collect();
        let total = items.iter().map(OrderLine::subtotal).sum();
        Ok(Self {
            id: id.into(), items, total, shipping, payment, user_id: user_id.into(),
            status: OrderStatus::Pending, created_at: Utc::now(),
        })
    }

    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }

    pub fn from_record(id: &str, record: Value) -> Result<Self, RecordError> {
        let mut order: Order = serde_json::from_value(record).map_err(|e| RecordError::new(format!("orders/{id}"), e))?;
        order.id = id.to_string();
        Ok(order)
    }

    pub fn to_record(&self) -> Value { serde_json::to_value(self).unwrap_or(Value::Null) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
}

fn min_trimmed(value: &str, min: usize, code: &'static str, message: &'static str) -> Result<(), ValidationError> {
    if value.trim().chars().count() >= min { Ok(()) } else { Err(field_error(code, message)) }
}

fn first_name_rule(value: &str) -> Result<(), ValidationError> { min_trimmed(value, 2, "first_name", "First name must be at least 2 characters") }
fn last_name_rule(value: &str) -> Result<(), ValidationError> { min_trimmed(value, 2, "last_name", "Last name must be at least 2 characters") }
fn street_rule(value: &str) -> Result<(), ValidationError> { min_trimmed(value, 5, "address", "Please enter a valid address") }
fn city_rule(value: &str) -> Result<(), ValidationError> { min_trimmed(value, 2, "city", "City must be at least 2 characters") }
fn state_rule(value: &str) -> Result<(), ValidationError> { min_trimmed(value, 2, "state", "Please enter a valid state") }

fn zip_rule(value: &str) -> Result<(), ValidationError> {
    if ZIP.is_match(value) { Ok(()) } else { Err(field_error("zip", "Please enter a valid ZIP code")) }
}

fn phone_rule(value: &str) -> Result<(), ValidationError> {
    if value.chars().filter(char::is_ascii_digit).count() == 10 { Ok(()) } else { Err(field_error("phone", "Please enter a valid 10-digit phone number")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::Product;
    use rust_decimal::Decimal;

    fn address() -> ShippingAddress {
        ShippingAddress {
            first_name: "Ada".into(), last_name: "Lovelace".into(), address: "12 Analytical Way".into(),
            city: "London".into(), state: "NY".into(), zip: "12345".into(), phone: "(555) 123-4567".into(),
        }
    }

    fn cart() -> CartLedger {
        let mut cart = CartLedger::new();
        let p = |id: &str, cents, stock| Product {
            id: id.into(), name: id.to_uppercase(), category: "Books".into(),
            price: Money::new(Decimal::new(cents, 2)).unwrap(), quantity: stock, description: String::new(), image: String::new(),
        };
        cart.add_item(&p("p1", 1000, 9), 2).unwrap();
        cart.add_item(&p("p2", 550, 9), 1).unwrap();
        cart
    }

    #[test]
    fn test_valid_address() {
        assert!(address().validate().is_ok());
    }

    #[test]
    fn test_zip_rules() {
        let mut a = address();
        a.zip = "1234".into();
        assert!(a.validate().unwrap_err().field_errors().contains_key("zip"));
        a.zip = "12345".into();
        assert!(a.validate().is_ok());
        a.zip = "12345-6789".into();
        assert!(a.validate().is_ok());
        a.zip = "12345-67".into();
        assert!(a.validate().is_err());
        a.zip = "١٢٣٤٥".into();
        assert!(a.validate().unwrap_err().field_errors().contains_key("zip"));
        a.zip = "12345-١٢٣٤".into();
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_every_field_is_reported() {
        let errors = ShippingAddress::default().validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["first_name", "last_name", "address", "city", "state", "zip", "phone"] {
            assert!(fields.contains_key(field), "missing error for {field}");
        }
    }

    #[test]
    fn test_name_is_trimmed_before_length_check() {
        let mut a = address();
        a.first_name = "  A ".into();
        assert!(a.validate().unwrap_err().field_errors().contains_key("first_name"));
    }

    #[test]
    fn test_phone_strips_punctuation() {
        let mut a = address();
        a.phone = "555.123.456".into();
        assert!(a.validate().is_err());
        a.phone = "555 123 4567".into();
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_order_from_cart() {
        let cart = cart();
        let order = Order::from_cart("o1", &cart, address(), PaymentSummary::Cash, "u1").unwrap();
        assert_eq!(order.total, cart.total());
        assert_eq!(order.total.amount(), Decimal::new(2550, 2));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.item_count(), 3);
    }

    #[test]
    fn test_order_rejects_empty_cart() {
        assert_eq!(Order::from_cart("o1", &CartLedger::new(), address(), PaymentSummary::Cash, "u1"), Err(OrderError::NoItems));
    }

    #[test]
    fn test_order_record_round_trip() {
        let order = Order::from_cart("o1", &cart(), address(), PaymentSummary::Mobile, "u1").unwrap();
        let record = order.to_record();
        assert_eq!(record["status"], "pending");
        assert_eq!(record["userId"], "u1");
        let back = Order::from_record("o1", record).unwrap();
        assert_eq!(back.items, order.items);
        assert_eq!(back.total, order.total);
        assert_eq!(back.created_at.timestamp_millis(), order.created_at.timestamp_millis());
    }
}
