//! Payment selection and its persisted summary

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use validator::{Validate, ValidationError, ValidationErrors};
use super::field_error;

static EXPIRY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(0[1-9]|1[0-2])/[0-9]{2}$").expect("static pattern"));
static CVV: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{3,4}$").expect("static pattern"));

/// What the shopper picked on the payment step. Card details live only in
/// memory; only [`PaymentSummary`] is ever written out.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PaymentSelection {
    Card(CardDetails),
    Mobile,
    Cash,
}

#[derive(Clone, PartialEq, Eq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    #[validate(custom = "sixteen_digits")]
    pub card_number: String,
    #[validate(custom = "month_slash_year")]
    pub expiry_date: String,
    #[validate(custom = "three_or_four_digits")]
    pub cvv: String,
}

impl CardDetails {
    pub fn new(card_number: impl Into<String>, expiry_date: impl Into<String>, cvv: impl Into<String>) -> Self {
        Self { card_number: card_number.into(), expiry_date: expiry_date.into(), cvv: cvv.into() }
    }

    fn digits(&self) -> String { self.card_number.chars().filter(|c| !c.is_whitespace()).collect() }

    pub fn last4(&self) -> String {
        let digits = self.digits();
        digits.chars().skip(digits.chars().count().saturating_sub(4)).collect()
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails").field("card_number", &format_args!("****{}", self.last4())).field("expiry_date", &self.expiry_date).finish_non_exhaustive()
    }
}

impl fmt::Debug for PaymentSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card(card) => f.debug_tuple("Card").field(card).finish(),
            Self::Mobile => write!(f, "Mobile"),
            Self::Cash => write!(f, "Cash"),
        }
    }
}

impl Validate for PaymentSelection {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::Card(card) => card.validate(),
            Self::Mobile | Self::Cash => Ok(()),
        }
    }
}

impl PaymentSelection {
    /// Drops everything sensitive: the card number shrinks to its last four
    /// digits and the CVV is gone.
    pub fn redact(&self) -> PaymentSummary {
        match self {
            Self::Card(card) => PaymentSummary::Card { card_last4: card.last4(), expiry_date: card.expiry_date.clone() },
            Self::Mobile => PaymentSummary::Mobile,
            Self::Cash => PaymentSummary::Cash,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "details", rename_all = "lowercase")]
pub enum PaymentSummary {
    #[serde(rename_all = "camelCase")]
    Card { card_last4: String, expiry_date: String },
    Mobile,
    Cash,
}

impl fmt::Display for PaymentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card { card_last4, .. } => write!(f, "Credit Card (ending in {card_last4})"),
            Self::Mobile => write!(f, "Mobile Payment"),
            Self::Cash => write!(f, "Cash on Delivery"),
        }
    }
}

fn sixteen_digits(value: &str) -> Result<(), ValidationError> {
    let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() == 16 && digits.chars().all(|c| c.is_ascii_digit()) { return Ok(()); }
    Err(field_error("card_number", "Please enter a valid 16-digit card number"))
}

fn month_slash_year(value: &str) -> Result<(), ValidationError> {
    if EXPIRY.is_match(value) { return Ok(()); }
    Err(field_error("expiry_date", "Please enter a valid expiry date (MM/YY)"))
}

fn three_or_four_digits(value: &str) -> Result<(), ValidationError> {
    if CVV.is_match(value) { return Ok(()); }
    Err(field_error("cvv", "Please enter a valid CVV"))
}
