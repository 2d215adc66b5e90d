//! Product and Category records
//!
//! These are the typed shapes of `products/{id}` and `categories/{id}` in the
//! Document Store. Records are parsed strictly: anything that does not fit the
//! shape is rejected instead of being carried around half-filled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::domain::value_objects::Money;

/// Pseudo-category that selects every product.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    /// Name of the owning category.
    pub category: String,
    pub price: Money,
    #[serde(alias = "stock")]
    pub quantity: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

impl Product {
    pub fn is_in_stock(&self) -> bool { self.quantity > 0 }

    pub fn from_record(id: &str, record: Value) -> Result<Self, RecordError> {
        let mut product: Product = serde_json::from_value(record).map_err(|e| RecordError::new(format!("products/{id}"), e))?;
        if product.name.trim().is_empty() { return Err(RecordError::new(format!("products/{id}"), "name is empty")); }
        if !product.price.is_valid_price() { return Err(RecordError::new(format!("products/{id}"), format!("price {} is above {}", product.price, Money::MAX_PRICE))); }
        product.id = id.to_string();
        Ok(product)
    }

    pub fn to_record(&self) -> Value {
        let mut record = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut record { map.insert("id".into(), Value::String(self.id.clone())); }
        record
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), created_at: Utc::now() }
    }

    pub fn from_record(id: &str, record: Value) -> Result<Self, RecordError> {
        let mut category: Category = serde_json::from_value(record).map_err(|e| RecordError::new(format!("categories/{id}"), e))?;
        if category.name.trim().is_empty() { return Err(RecordError::new(format!("categories/{id}"), "name is empty")); }
        category.id = id.to_string();
        Ok(category)
    }

    pub fn to_record(&self) -> Value { serde_json::to_value(self).unwrap_or(Value::Null) }
}

/// A record under `path` that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed record at {path}: {reason}")]
pub struct RecordError {
    pub path: String,
    pub reason: String,
}

impl RecordError {
    pub fn new(path: impl Into<String>, reason: impl ToString) -> Self {
        Self { path: path.into(), reason: reason.to_string() }
    }
}

/// Parses a collection node (`{key: record, ...}`) into typed records, in key order.
pub fn parse_collection<T>(node: Option<Value>, parse: impl Fn(&str, Value) -> Result<T, RecordError>) -> Result<Vec<T>, RecordError> {
    match node {
        None | Some(Value::Null) => Ok(vec![]),
        Some(Value::Object(map)) => map.into_iter().map(|(key, record)| parse(&key, record)).collect(),
        Some(other) => Err(RecordError::new("collection", format!("expected an object, found {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_product_from_record() {
        let p = Product::from_record("p1", json!({"name": "Laptop Pro X", "category": "Electronics", "price": 1299.99, "stock": 50, "createdAt": 1700000000000i64})).unwrap();
        assert_eq!(p.id, "p1");
        assert_eq!(p.quantity, 50);
        assert_eq!(p.price.amount(), Decimal::new(129999, 2));
        assert!(p.description.is_empty());
    }

    #[test]
    fn test_product_rejects_missing_price() {
        let err = Product::from_record("p2", json!({"name": "Shoes", "category": "Sports", "quantity": 1})).unwrap_err();
        assert_eq!(err.path, "products/p2");
    }

    #[test]
    fn test_product_rejects_negative_stock() {
        assert!(Product::from_record("p3", json!({"name": "X", "category": "C", "price": "1.00", "quantity": -1})).is_err());
    }

    #[test]
    fn test_product_rejects_price_above_cap() {
        let err = Product::from_record("p4", json!({"name": "X", "category": "C", "price": "1000000.01", "quantity": 1})).unwrap_err();
        assert_eq!(err.path, "products/p4");
        assert!(Product::from_record("p4", json!({"name": "X", "category": "C", "price": "1000000.00", "quantity": 1})).is_ok());
    }

    #[test]
    fn test_product_record_carries_id() {
        let p = Product::from_record("p1", json!({"name": "A", "category": "C", "price": "2.50", "quantity": 3})).unwrap();
        let record = p.to_record();
        assert_eq!(record["id"], "p1");
        assert_eq!(Product::from_record("p1", record).unwrap(), p);
    }

    #[test]
    fn test_category_round_trip_keeps_millis() {
        let c = Category::from_record("c1", json!({"name": "Books", "createdAt": 1700000000123i64})).unwrap();
        assert_eq!(c.created_at.timestamp_millis(), 1700000000123);
        assert_eq!(c.to_record()["createdAt"], 1700000000123i64);
    }

    #[test]
    fn test_parse_collection() {
        let node = json!({"a": {"name": "Books", "createdAt": 0}, "b": {"name": "Toys", "createdAt": 0}});
        let cats = parse_collection(Some(node), Category::from_record).unwrap();
        assert_eq!(cats.len(), 2);
        assert!(parse_collection(None, Category::from_record).unwrap().is_empty());
        assert!(parse_collection(Some(json!([1, 2])), Category::from_record).is_err());
    }
}
