//! OpenSASE Storefront
//!
//! Cart, checkout and inventory-reservation engine for a storefront whose
//! persistence, identity and file storage are external services.
//!
//! ## Features
//! - Catalog cache with category filtering
//! - Cart ledger with absolute quantities and derived totals
//! - Advisory stock check and compare-and-set stock reservation
//! - Multi-step checkout (address, payment, review, submit)
//! - Immutable order snapshots with redacted payment data
//! - Admin catalog management, image upload and dashboard stats

use thiserror::Error;

pub mod admin;
pub mod api;
pub mod auth;
pub mod blob;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod inventory;
pub mod orders;
pub mod store;

pub use domain::aggregates::{CartLedger, Category, Order, Product, ShippingAddress};
pub use domain::value_objects::{CardDetails, Money, PaymentSelection, PaymentSummary};

use auth::AuthError;
use blob::BlobError;
use catalog::CatalogLoadError;
use checkout::CheckoutStep;
use domain::aggregates::{CartError, OrderError, RecordError};
use inventory::{Shortfall, ShortfallReason};
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("{}", describe_shortfalls(.0))]
    InsufficientStock(Vec<Shortfall>),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Failed to create order: {0}")]
    OrderPersistence(#[source] StoreError),

    #[error(transparent)]
    CatalogLoad(#[from] CatalogLoadError),

    #[error(transparent)]
    Malformed(#[from] RecordError),

    #[error("Please log in to proceed with checkout")]
    NotAuthenticated,

    #[error("Admin access required")]
    Forbidden,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Cannot {action} from the {from:?} step")]
    InvalidTransition { from: CheckoutStep, action: &'static str },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Category {0:?} is still used by products")]
    CategoryInUse(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

fn describe_shortfalls(shortfalls: &[Shortfall]) -> String {
    let ids = |reason: ShortfallReason| shortfalls.iter().filter(|s| s.reason == reason).map(|s| s.product_id.as_str()).collect::<Vec<_>>().join(", ");
    let (short, busy) = (ids(ShortfallReason::OutOfStock), ids(ShortfallReason::Contended));
    match (short.is_empty(), busy.is_empty()) {
        (_, true) => format!("Insufficient stock for {short}"),
        (true, false) => format!("Stock for {busy} kept changing, please try again"),
        (false, false) => format!("Insufficient stock for {short}; stock for {busy} kept changing, please try again"),
    }
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::InvalidQuantity => Self::InvalidQuantity,
            CartError::InsufficientStock { product_id, requested, available } => Self::InsufficientStock(vec![Shortfall::out_of_stock(product_id, requested, available)]),
        }
    }
}

impl From<OrderError> for StorefrontError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems => Self::EmptyCart,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
