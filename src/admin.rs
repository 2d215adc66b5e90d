//! Admin catalog management
//!
//! The write path for products and categories. Every write goes straight to
//! the Document Store and then drops the catalog cache so shoppers re-fetch.
//! Products may only name existing categories, and a category that products
//! still reference can be neither renamed nor deleted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::{Validate, ValidationError, ValidationErrors};
use crate::auth::{Role, UserProfile};
use crate::blob::{self, BlobStore, ImageUpload};
use crate::catalog::CatalogCache;
use crate::domain::aggregates::{parse_collection, Category, Order, Product};
use crate::domain::events::{DomainEvent, EventPublisher};
use crate::domain::value_objects::{field_error, Money};
use crate::store::{self, DocumentStore, CATEGORIES, ORDERS, PRODUCTS, USERS};
use crate::{Result, StorefrontError};

const DEFAULT_CATEGORIES: [&str; 10] = [
    "Electronics", "Clothing", "Books", "Home & Kitchen", "Sports & Outdoors",
    "Toys & Games", "Beauty & Personal Care", "Health & Wellness", "Automotive", "Office Products",
];

/// Product fields as submitted from the admin form.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[validate(custom = "product_name_rule")]
    pub name: String,
    #[validate(custom = "category_rule")]
    pub category: String,
    #[validate(custom = "price_rule")]
    pub price: Money,
    #[serde(alias = "stock")]
    pub quantity: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

impl ProductDraft {
    fn into_product(self, id: String) -> Product {
        Product {
            id, name: self.name.trim().to_string(), category: self.category, price: self.price,
            quantity: self.quantity, description: self.description, image: self.image,
        }
    }
}

fn product_name_rule(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() { Err(field_error("name", "Product name is required")) } else { Ok(()) }
}

fn category_rule(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() { Err(field_error("category", "Please select a category")) } else { Ok(()) }
}

fn price_rule(value: &Money) -> std::result::Result<(), ValidationError> {
    if value.is_valid_price() { Ok(()) } else { Err(field_error("price", "Price must not exceed $1000000.00")) }
}

fn single_error(field: &'static str, code: &'static str, message: &'static str) -> StorefrontError {
    let mut errors = ValidationErrors::new();
    errors.add(field, field_error(code, message));
    StorefrontError::Validation(errors)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_sales: Money,
    pub total_orders: usize,
    pub total_customers: usize,
    pub total_products: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub categories: usize,
    pub products: usize,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<CatalogCache>,
    blobs: Arc<dyn BlobStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl AdminService {
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<CatalogCache>, blobs: Arc<dyn BlobStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, catalog, blobs, publisher }
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        Ok(parse_collection(self.store.get(CATEGORIES).await?, Category::from_record)?)
    }

    async fn products(&self) -> Result<Vec<Product>> {
        Ok(parse_collection(self.store.get(PRODUCTS).await?, Product::from_record)?)
    }

    async fn category(&self, id: &str) -> Result<Category> {
        let record = self.store.get(&store::category_path(id)).await?.ok_or_else(|| StorefrontError::NotFound(format!("Category {id}")))?;
        Ok(Category::from_record(id, record)?)
    }

    pub async fn product(&self, id: &str) -> Result<Product> {
        let record = self.store.get(&store::product_path(id)).await?.ok_or_else(|| StorefrontError::NotFound(format!("Product {id}")))?;
        Ok(Product::from_record(id, record)?)
    }

    async fn require_category(&self, name: &str) -> Result<()> {
        if self.categories().await?.iter().any(|c| c.name == name) { Ok(()) } else {
            Err(single_error("category", "unknown_category", "Please select an existing category"))
        }
    }

    async fn ensure_unreferenced(&self, category: &Category) -> Result<()> {
        if self.products().await?.iter().any(|p| p.category == category.name) {
            return Err(StorefrontError::CategoryInUse(category.name.clone()));
        }
        Ok(())
    }

    async fn ensure_unique_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        let taken = self.categories().await?.iter().any(|c| Some(c.id.as_str()) != except_id && c.name.eq_ignore_ascii_case(name));
        if taken { Err(single_error("name", "duplicate", "Category already exists")) } else { Ok(()) }
    }

    async fn saved(&self, event: DomainEvent) {
        self.catalog.invalidate().await;
        self.publisher.publish(event).await;
    }

    #[tracing::instrument(skip_all, fields(name = %draft.name))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        self.require_category(&draft.category).await?;
        let path = self.store.push(PRODUCTS).await?;
        let product = draft.into_product(store::key_of(&path).to_string());
        self.store.set(&path, product.to_record()).await?;
        tracing::info!(product_id = %product.id, "product created");
        self.saved(DomainEvent::ProductSaved { product_id: product.id.clone() }).await;
        Ok(product)
    }

    #[tracing::instrument(skip(self, draft))]
    pub async fn update_product(&self, id: &str, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        self.product(id).await?;
        self.require_category(&draft.category).await?;
        let product = draft.into_product(id.to_string());
        self.store.set(&store::product_path(id), product.to_record()).await?;
        tracing::info!("product updated");
        self.saved(DomainEvent::ProductSaved { product_id: product.id.clone() }).await;
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: &str) -> Result<()> {
        self.product(id).await?;
        self.store.remove(&store::product_path(id)).await?;
        tracing::info!("product deleted");
        self.saved(DomainEvent::ProductDeleted { product_id: id.to_string() }).await;
        Ok(())
    }

    /// Uploads `image` and points the product at its URL.
    #[tracing::instrument(skip(self, image))]
    pub async fn attach_image(&self, id: &str, image: ImageUpload) -> Result<Product> {
        let mut product = self.product(id).await?;
        let url = blob::upload_image(self.blobs.as_ref(), image).await?;
        self.store.update(&store::product_path(id), json!({ "image": url })).await?;
        product.image = url;
        self.saved(DomainEvent::ProductSaved { product_id: product.id.clone() }).await;
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() { return Err(single_error("name", "required", "Category name is required")); }
        self.ensure_unique_name(name, None).await?;
        let path = self.store.push(CATEGORIES).await?;
        let category = Category::new(store::key_of(&path), name);
        self.store.set(&path, category.to_record()).await?;
        tracing::info!(category_id = %category.id, "category created");
        self.saved(DomainEvent::CategorySaved { category_id: category.id.clone(), name: category.name.clone() }).await;
        Ok(category)
    }

    #[tracing::instrument(skip(self))]
    pub async fn rename_category(&self, id: &str, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() { return Err(single_error("name", "required", "Category name is required")); }
        let mut category = self.category(id).await?;
        if category.name == name { return Ok(category); }
        self.ensure_unique_name(name, Some(id)).await?;
        self.ensure_unreferenced(&category).await?;
        self.store.update(&store::category_path(id), json!({ "name": name })).await?;
        category.name = name.to_string();
        self.saved(DomainEvent::CategorySaved { category_id: category.id.clone(), name: category.name.clone() }).await;
        Ok(category)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: &str) -> Result<()> {
        let category = self.category(id).await?;
        self.ensure_unreferenced(&category).await?;
        self.store.remove(&store::category_path(id)).await?;
        tracing::info!(name = %category.name, "category deleted");
        self.saved(DomainEvent::CategoryDeleted { category_id: id.to_string() }).await;
        Ok(())
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let orders = parse_collection(self.store.get(ORDERS).await?, Order::from_record)?;
        let total_sales = orders.iter().map(|o| o.total).sum();
        let total_customers = match self.store.get(USERS).await? {
            Some(Value::Object(users)) => users.into_values()
                .filter_map(|record| serde_json::from_value::<UserProfile>(record).ok())
                .filter(|profile| profile.role == Role::Customer).count(),
            _ => 0,
        };
        Ok(DashboardStats { total_sales, total_orders: orders.len(), total_customers, total_products: self.products().await?.len() })
    }

    /// Writes the default categories and products into an empty catalog.
    /// Each collection is only seeded when it holds nothing yet.
    pub async fn seed_defaults(&self) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        if self.store.get(CATEGORIES).await?.is_none() {
            for name in DEFAULT_CATEGORIES {
                let path = self.store.push(CATEGORIES).await?;
                self.store.set(&path, Category::new(store::key_of(&path), name).to_record()).await?;
                report.categories += 1;
            }
        }
        if self.store.get(PRODUCTS).await?.is_none() {
            for draft in default_products() {
                let path = self.store.push(PRODUCTS).await?;
                self.store.set(&path, draft.into_product(store::key_of(&path).to_string()).to_record()).await?;
                report.products += 1;
            }
        }
        if report != SeedReport::default() {
            tracing::info!(categories = report.categories, products = report.products, "catalog seeded");
            self.catalog.invalidate().await;
        }
        Ok(report)
    }
}

fn default_products() -> Vec<ProductDraft> {
    let draft = |name: &str, description: &str, cents: i64, category: &str, image: &str, quantity| ProductDraft {
        name: name.into(), description: description.into(), price: Money::new(Decimal::new(cents, 2)).unwrap_or(Money::ZERO),
        category: category.into(), image: image.into(), quantity,
    };
    vec![
        draft("Laptop Pro X", "High-performance laptop with the latest technology", 129999, "Electronics", "https://example.com/laptop.jpg", 50),
        draft("Running Shoes", "Comfortable running shoes for professional athletes", 8999, "Sports & Outdoors", "https://example.com/shoes.jpg", 100),
    ]
}
