//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{parse_collection, Category, Product, RecordError, ALL_CATEGORIES};
pub use order::{Order, OrderError, OrderLine, OrderStatus, ShippingAddress};
pub use cart::{CartError, CartLedger, CartLineItem};
