//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use thiserror::Error;
use validator::ValidationError;

pub mod payment;

pub use payment::{CardDetails, PaymentSelection, PaymentSummary};

/// Non-negative monetary amount in the store currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// Highest unit price a product may carry.
    pub const MAX_PRICE: Money = Money(Decimal::from_parts(100_000_000, 0, 0, false, 2));

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative(amount)); }
        Ok(Self(amount))
    }
    pub fn amount(&self) -> Decimal { self.0 }
    /// Saturates at `Decimal::MAX` instead of overflowing.
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(Decimal::from(qty))) }
    pub fn is_valid_price(&self) -> bool { *self <= Self::MAX_PRICE }
}

impl Add for Money {
    type Output = Money;
    fn add(self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Money::new(value) }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self { value.0 }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "${:.2}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount {0} is negative")]
    Negative(Decimal),
}

/// Requested line quantity, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Quantity::new(value) }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self { value.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
}

/// Field-level validation failure carrying the message shown next to the field.
pub(crate) fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::new(Decimal::new(1000, 2)).unwrap(), Money::new(Decimal::new(550, 2)).unwrap()].into_iter().sum();
        assert_eq!(total.amount(), Decimal::new(1550, 2));
        assert_eq!(total.to_string(), "$15.50");
    }

    #[test]
    fn test_money_rejects_negative() {
        assert!(matches!(Money::new(Decimal::new(-1, 2)), Err(MoneyError::Negative(_))));
        assert_eq!(Money::new(Decimal::ZERO).unwrap(), Money::ZERO);
    }

    #[test]
    fn test_money_deserialize_checks_sign() {
        assert!(serde_json::from_value::<Money>(serde_json::json!("-3.00")).is_err());
        let m: Money = serde_json::from_value(serde_json::json!(1299.99)).unwrap();
        assert_eq!(m.amount(), Decimal::new(129999, 2));
    }

    #[test]
    fn test_arithmetic_saturates() {
        let huge = Money::new(Decimal::MAX).unwrap();
        assert_eq!(huge.multiply(2).amount(), Decimal::MAX);
        assert_eq!((huge + huge).amount(), Decimal::MAX);
        assert!(!huge.is_valid_price());
        assert!(Money::MAX_PRICE.is_valid_price());
        assert_eq!(Money::MAX_PRICE.amount(), Decimal::new(1_000_000, 0));
    }

    #[test]
    fn test_quantity() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::new(3).unwrap().value(), 3);
        assert!(serde_json::from_value::<Quantity>(serde_json::json!(0)).is_err());
    }
}
