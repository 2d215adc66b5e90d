//! HTTP surface over the storefront library.
//!
//! Every shopper works through a session named by the `x-session-id` header.
//! A session owns one cart and at most one checkout and is locked for the
//! whole of each request, so a session only ever has one writer.

use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::admin::{AdminService, ProductDraft};
use crate::auth::{Accounts, AuthError, CredentialService, Credentials, Principal};
use crate::blob::{BlobError, BlobStore, ImageUpload, MemoryBlobStore, MAX_IMAGE_BYTES};
use crate::catalog::CatalogCache;
use crate::checkout::Checkout;
use crate::domain::aggregates::{CartLedger, CartLineItem, ShippingAddress, ALL_CATEGORIES};
use crate::domain::events::EventPublisher;
use crate::domain::value_objects::{Money, PaymentSelection};
use crate::inventory::check_availability;
use crate::orders::OrderAssembler;
use crate::store::{DocumentStore, StoreError};
use crate::StorefrontError;

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Default)]
pub struct Session {
    pub principal: Option<Principal>,
    pub cart: CartLedger,
    pub checkout: Option<Checkout>,
}

impl Session {
    fn principal(&self) -> Result<&Principal, StorefrontError> { self.principal.as_ref().ok_or(StorefrontError::NotAuthenticated) }

    fn admin(&self) -> Result<&Principal, StorefrontError> {
        let principal = self.principal()?;
        principal.require_admin()?;
        Ok(principal)
    }

    fn checkout(&mut self) -> Result<&mut Checkout, StorefrontError> {
        self.checkout.as_mut().ok_or_else(|| StorefrontError::NotFound("Checkout".into()))
    }
}

pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// Live sessions. Idle ones expire, and at capacity the least recently used is evicted.
struct Sessions {
    entries: std::sync::Mutex<HashMap<String, SessionEntry>>,
    idle: Duration,
    capacity: usize,
}

impl Default for Sessions {
    fn default() -> Self { Self::new(DEFAULT_SESSION_IDLE, DEFAULT_MAX_SESSIONS) }
}

impl Sessions {
    fn new(idle: Duration, capacity: usize) -> Self {
        Self { entries: std::sync::Mutex::default(), idle, capacity: capacity.max(1) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.last_seen.elapsed() < self.idle);
        if entries.len() >= self.capacity {
            let oldest = entries.iter().min_by_key(|(_, entry)| entry.last_seen).map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                tracing::debug!(session_id = %oldest, "session evicted");
            }
        }
        entries.insert(id.clone(), SessionEntry { session: Arc::default(), last_seen: Instant::now() });
        id
    }

    fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        let mut entries = self.lock();
        let entry = entries.get_mut(id)?;
        if entry.last_seen.elapsed() >= self.idle {
            entries.remove(id);
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    fn remove(&self, id: &str) -> bool { self.lock().remove(id).is_some() }

    #[cfg(test)]
    fn len(&self) -> usize { self.lock().len() }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogCache>,
    pub orders: OrderAssembler,
    pub accounts: Accounts,
    pub admin: AdminService,
    served_blobs: Option<Arc<MemoryBlobStore>>,
    sessions: Arc<Sessions>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, credentials: Arc<dyn CredentialService>, blobs: Arc<dyn BlobStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        let catalog = Arc::new(CatalogCache::new(store.clone()));
        Self {
            orders: OrderAssembler::new(store.clone(), publisher.clone()),
            accounts: Accounts::new(credentials, store.clone()),
            admin: AdminService::new(store, catalog.clone(), blobs, publisher),
            catalog,
            served_blobs: None,
            sessions: Arc::default(),
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.orders = self.orders.with_retry_limit(retry_limit);
        self
    }

    pub fn with_admin_email(mut self, email: Option<String>) -> Self {
        self.accounts = self.accounts.with_admin_email(email);
        self
    }

    /// Idle time after which a session expires, and the most sessions kept at once.
    pub fn with_session_limits(mut self, idle: Duration, capacity: usize) -> Self {
        self.sessions = Arc::new(Sessions::new(idle, capacity));
        self
    }

    /// Serves objects of an in-memory Blob Store under `/blobs/`.
    pub fn serving_blobs(mut self, blobs: Arc<MemoryBlobStore>) -> Self {
        self.served_blobs = Some(blobs);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .route("/blobs/*key", get(serve_blob))
        .route("/api/v1/sessions", post(create_session).delete(end_session))
        .route("/api/v1/auth/sign-up", post(sign_up))
        .route("/api/v1/auth/sign-in", post(sign_in))
        .route("/api/v1/auth/sign-out", post(sign_out))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_to_cart))
        .route("/api/v1/cart/items/:product_id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/checkout", get(get_checkout).post(begin_checkout))
        .route("/api/v1/checkout/shipping", put(submit_shipping))
        .route("/api/v1/checkout/payment", put(submit_payment))
        .route("/api/v1/checkout/back", post(checkout_back))
        .route("/api/v1/checkout/place", post(place_order))
        .route("/api/v1/profile", get(get_profile))
        .route("/api/v1/profile/payment-methods", post(save_payment_method))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/admin/products", post(admin_create_product))
        .route("/api/v1/admin/products/:id", put(admin_update_product).delete(admin_delete_product))
        .route("/api/v1/admin/products/:id/image", put(admin_upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024)))
        .route("/api/v1/admin/categories", post(admin_create_category))
        .route("/api/v1/admin/categories/:id", put(admin_rename_category).delete(admin_delete_category))
        .route("/api/v1/admin/stats", get(admin_stats))
        .route("/api/v1/admin/seed", post(admin_seed))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Storefront(StorefrontError),
    MissingSession,
    UnknownSession,
}

impl From<StorefrontError> for ApiError {
    fn from(e: StorefrontError) -> Self { Self::Storefront(e) }
}

type ApiResult<T> = Result<T, ApiError>;

fn status_of(e: &StorefrontError) -> StatusCode {
    match e {
        StorefrontError::InvalidQuantity | StorefrontError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StorefrontError::InsufficientStock(_) | StorefrontError::InvalidTransition { .. } | StorefrontError::CategoryInUse(_) => StatusCode::CONFLICT,
        StorefrontError::EmptyCart => StatusCode::BAD_REQUEST,
        StorefrontError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        StorefrontError::Forbidden => StatusCode::FORBIDDEN,
        StorefrontError::NotFound(_) => StatusCode::NOT_FOUND,
        StorefrontError::OrderPersistence(_) | StorefrontError::CatalogLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorefrontError::Store(StoreError::Unavailable(_) | StoreError::Database(_)) => StatusCode::SERVICE_UNAVAILABLE,
        StorefrontError::Store(_) | StorefrontError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StorefrontError::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
        StorefrontError::Auth(AuthError::EmailTaken) => StatusCode::CONFLICT,
        StorefrontError::Auth(AuthError::PasswordHash) => StatusCode::INTERNAL_SERVER_ERROR,
        StorefrontError::Auth(AuthError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
        StorefrontError::Blob(BlobError::UnsupportedType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        StorefrontError::Blob(BlobError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
        StorefrontError::Blob(BlobError::Empty) => StatusCode::BAD_REQUEST,
        StorefrontError::Blob(BlobError::NotFound(_)) => StatusCode::NOT_FOUND,
        StorefrontError::Blob(BlobError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' { upper = true; continue; }
        if upper { out.extend(c.to_uppercase()) } else { out.push(c) }
        upper = false;
    }
    out
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            Self::MissingSession => return (StatusCode::BAD_REQUEST, Json(json!({"error": format!("missing {SESSION_HEADER} header")}))).into_response(),
            Self::UnknownSession => return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unknown session"}))).into_response(),
            Self::Storefront(e) => e,
        };
        let status = status_of(&e);
        if status.is_server_error() { tracing::error!(error = %e, "request failed"); }
        let mut body = Map::new();
        body.insert("error".into(), Value::String(e.to_string()));
        match &e {
            StorefrontError::Validation(errors) => {
                let fields: Map<String, Value> = errors.field_errors().into_iter().map(|(field, errors)| {
                    let messages = errors.iter().map(|err| err.message.as_ref().map_or_else(|| err.code.to_string(), ToString::to_string)).collect::<Vec<_>>();
                    (camel_case(field), json!(messages))
                }).collect();
                body.insert("fields".into(), Value::Object(fields));
            }
            StorefrontError::InsufficientStock(shortfalls) => { body.insert("shortfalls".into(), json!(shortfalls)); }
            _ => {}
        }
        (status, Json(Value::Object(body))).into_response()
    }
}

// =============================================================================
// Sessions
// =============================================================================

pub struct CurrentSession(Arc<Mutex<Session>>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.sessions.get(session_id(&parts.headers)?).map(CurrentSession).ok_or(ApiError::UnknownSession)
    }
}

fn session_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).ok_or(ApiError::MissingSession)
}

/// A record whose key lives outside its body.
#[derive(Serialize)]
struct Keyed<'a, T: Serialize> {
    id: &'a str,
    #[serde(flatten)]
    record: &'a T,
}

fn keyed<'a, T: Serialize>(id: &'a str, record: &'a T) -> Keyed<'a, T> { Keyed { id, record } }

async fn create_session(State(s): State<AppState>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({ "sessionId": s.sessions.create() })))
}

async fn end_session(State(s): State<AppState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    if s.sessions.remove(session_id(&headers)?) { Ok(StatusCode::NO_CONTENT) } else { Err(ApiError::UnknownSession) }
}

async fn sign_up(State(s): State<AppState>, CurrentSession(session): CurrentSession, Json(r): Json<Credentials>) -> ApiResult<(StatusCode, Json<Principal>)> {
    let principal = s.accounts.register(&r).await?;
    session.lock().await.principal = Some(principal.clone());
    Ok((StatusCode::CREATED, Json(principal)))
}

async fn sign_in(State(s): State<AppState>, CurrentSession(session): CurrentSession, Json(r): Json<Credentials>) -> ApiResult<Json<Principal>> {
    let principal = s.accounts.login(&r.email, &r.password).await?;
    session.lock().await.principal = Some(principal.clone());
    Ok(Json(principal))
}

async fn sign_out(CurrentSession(session): CurrentSession) -> StatusCode {
    let mut session = session.lock().await;
    session.principal = None;
    session.checkout = None;
    StatusCode::NO_CONTENT
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Deserialize)] pub struct CatalogParams { pub category: Option<String> }

async fn list_products(State(s): State<AppState>, Query(p): Query<CatalogParams>) -> Json<Value> {
    let snapshot = s.catalog.snapshot().await;
    let category = p.category.as_deref().unwrap_or(ALL_CATEGORIES);
    let products: Vec<_> = snapshot.filter_by_category(category).into_iter().map(|p| keyed(&p.id, p)).collect();
    Json(json!({ "category": category, "products": products, "loadError": snapshot.load_error() }))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let snapshot = s.catalog.snapshot().await;
    let product = snapshot.product(&id).ok_or_else(|| StorefrontError::NotFound(format!("Product {id}")))?;
    Ok(Json(json!(keyed(&product.id, product))))
}

async fn list_categories(State(s): State<AppState>) -> Json<Value> {
    let snapshot = s.catalog.snapshot().await;
    let categories: Vec<_> = snapshot.categories().iter().map(|c| keyed(&c.id, c)).collect();
    Json(json!({ "categories": categories, "loadError": snapshot.load_error() }))
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CartView<'a> { items: &'a [CartLineItem], total: Money, item_count: usize, unit_count: u32 }

fn cart_view(cart: &CartLedger) -> Json<Value> {
    Json(json!(CartView { items: cart.items(), total: cart.total(), item_count: cart.item_count(), unit_count: cart.unit_count() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest { pub product_id: String, pub quantity: u32 }

#[derive(Debug, Deserialize)] pub struct QuantityRequest { pub quantity: u32 }

async fn get_cart(CurrentSession(session): CurrentSession) -> Json<Value> {
    let session = session.lock().await;
    cart_view(&session.cart)
}

async fn add_to_cart(State(s): State<AppState>, CurrentSession(session): CurrentSession, Json(r): Json<AddToCartRequest>) -> ApiResult<Json<Value>> {
    let snapshot = s.catalog.snapshot().await;
    let product = snapshot.product(&r.product_id).ok_or_else(|| StorefrontError::NotFound(format!("Product {}", r.product_id)))?;
    let mut session = session.lock().await;
    session.cart.add_item(product, r.quantity).map_err(StorefrontError::from)?;
    Ok(cart_view(&session.cart))
}

async fn update_cart_item(CurrentSession(session): CurrentSession, Path(product_id): Path<String>, Json(r): Json<QuantityRequest>) -> ApiResult<Json<Value>> {
    let mut session = session.lock().await;
    session.cart.update_quantity(&product_id, r.quantity).map_err(StorefrontError::from)?;
    Ok(cart_view(&session.cart))
}

async fn remove_cart_item(CurrentSession(session): CurrentSession, Path(product_id): Path<String>) -> Json<Value> {
    let mut session = session.lock().await;
    session.cart.remove_item(&product_id);
    cart_view(&session.cart)
}

async fn clear_cart(CurrentSession(session): CurrentSession) -> StatusCode {
    session.lock().await.cart.clear();
    StatusCode::NO_CONTENT
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackTarget { Address, Payment }

#[derive(Debug, Deserialize)] pub struct BackRequest { pub to: BackTarget }

fn checkout_view(checkout: &Checkout) -> Json<Value> { Json(json!(checkout.view())) }

/// Starts checkout after an advisory stock check against the cached catalog.
async fn begin_checkout(State(s): State<AppState>, CurrentSession(session): CurrentSession) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut session = session.lock().await;
    let checkout = Checkout::begin(session.principal.as_ref(), &session.cart)?;
    check_availability(&session.cart, &*s.catalog.snapshot().await).map_err(StorefrontError::InsufficientStock)?;
    let view = checkout_view(&checkout);
    session.checkout = Some(checkout);
    Ok((StatusCode::CREATED, view))
}

async fn get_checkout(CurrentSession(session): CurrentSession) -> ApiResult<Json<Value>> {
    let mut session = session.lock().await;
    Ok(checkout_view(session.checkout()?))
}

async fn submit_shipping(CurrentSession(session): CurrentSession, Json(r): Json<ShippingAddress>) -> ApiResult<Json<Value>> {
    let mut session = session.lock().await;
    let checkout = session.checkout()?;
    checkout.validate_shipping(r)?;
    Ok(checkout_view(checkout))
}

async fn submit_payment(CurrentSession(session): CurrentSession, Json(r): Json<PaymentSelection>) -> ApiResult<Json<Value>> {
    let mut session = session.lock().await;
    let checkout = session.checkout()?;
    checkout.validate_payment(r)?;
    Ok(checkout_view(checkout))
}

async fn checkout_back(CurrentSession(session): CurrentSession, Json(r): Json<BackRequest>) -> ApiResult<Json<Value>> {
    let mut session = session.lock().await;
    let checkout = session.checkout()?;
    match r.to {
        BackTarget::Address => checkout.back_to_address()?,
        BackTarget::Payment => checkout.back_to_payment()?,
    }
    Ok(checkout_view(checkout))
}

async fn place_order(State(s): State<AppState>, CurrentSession(session): CurrentSession) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut session = session.lock().await;
    let Session { cart, checkout, .. } = &mut *session;
    let checkout = checkout.as_mut().ok_or_else(|| StorefrontError::NotFound("Checkout".into()))?;
    let order = checkout.place_order(cart, &s.orders).await?;
    s.catalog.invalidate().await;
    Ok((StatusCode::CREATED, Json(json!(keyed(&order.id, &order)))))
}

// =============================================================================
// Profile
// =============================================================================

async fn get_profile(State(s): State<AppState>, CurrentSession(session): CurrentSession) -> ApiResult<Json<Value>> {
    let uid = session.lock().await.principal()?.uid().to_string();
    let profile = s.accounts.profile(&uid).await?.ok_or_else(|| StorefrontError::NotFound(format!("User {uid}")))?;
    Ok(Json(json!(profile)))
}

async fn save_payment_method(State(s): State<AppState>, CurrentSession(session): CurrentSession, Json(r): Json<PaymentSelection>) -> ApiResult<(StatusCode, Json<Value>)> {
    let uid = session.lock().await.principal()?.uid().to_string();
    let summary = s.accounts.save_payment_method(&uid, &r).await?;
    Ok((StatusCode::CREATED, Json(json!(summary))))
}

// =============================================================================
// Orders
// =============================================================================

async fn list_orders(State(s): State<AppState>, CurrentSession(session): CurrentSession) -> ApiResult<Json<Value>> {
    let uid = session.lock().await.principal()?.uid().to_string();
    let orders = s.orders.orders_for_user(&uid).await?;
    let orders: Vec<_> = orders.iter().map(|o| keyed(&o.id, o)).collect();
    Ok(Json(json!({ "orders": orders })))
}

async fn get_order(State(s): State<AppState>, CurrentSession(session): CurrentSession, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let principal = session.lock().await.principal()?.clone();
    let order = s.orders.load_order(&id).await?;
    if order.user_id != principal.uid() && !principal.is_admin() { return Err(StorefrontError::NotFound(format!("Order {id}")).into()); }
    Ok(Json(json!(keyed(&order.id, &order))))
}

// =============================================================================
// Admin
// =============================================================================

async fn require_admin(session: &Mutex<Session>) -> ApiResult<()> {
    session.lock().await.admin()?;
    Ok(())
}

#[derive(Debug, Deserialize)] pub struct CategoryRequest { pub name: String }
#[derive(Debug, Deserialize)] pub struct ImageParams { pub name: Option<String> }

async fn admin_create_product(State(s): State<AppState>, CurrentSession(session): CurrentSession, Json(r): Json<ProductDraft>) -> ApiResult<(StatusCode, Json<Value>)> {
    require_admin(&session).await?;
    let product = s.admin.create_product(r).await?;
    Ok((StatusCode::CREATED, Json(json!(keyed(&product.id, &product)))))
}

async fn admin_update_product(State(s): State<AppState>, CurrentSession(session): CurrentSession, Path(id): Path<String>, Json(r): Json<ProductDraft>) -> ApiResult<Json<Value>> {
    require_admin(&session).await?;
    let product = s.admin.update_product(&id, r).await?;
    Ok(Json(json!(keyed(&product.id, &product))))
}

async fn admin_delete_product(State(s): State<AppState>, CurrentSession(session): CurrentSession, Path(id): Path<String>) -> ApiResult<StatusCode> {
    require_admin(&session).await?;
    s.admin.delete_product(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_upload_image(State(s): State<AppState>, CurrentSession(session): CurrentSession, Path(id): Path<String>, Query(p): Query<ImageParams>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Value>> {
    require_admin(&session).await?;
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    let image = ImageUpload::new(p.name.unwrap_or_else(|| "image".into()), content_type, body.to_vec());
    let product = s.admin.attach_image(&id, image).await?;
    Ok(Json(json!(keyed(&product.id, &product))))
}

async fn admin_create_category(State(s): State<AppState>, CurrentSession(session): CurrentSession, Json(r): Json<CategoryRequest>) -> ApiResult<(StatusCode, Json<Value>)> {
    require_admin(&session).await?;
    let category = s.admin.create_category(&r.name).await?;
    Ok((StatusCode::CREATED, Json(json!(keyed(&category.id, &category)))))
}

async fn admin_rename_category(State(s): State<AppState>, CurrentSession(session): CurrentSession, Path(id): Path<String>, Json(r): Json<CategoryRequest>) -> ApiResult<Json<Value>> {
    require_admin(&session).await?;
    let category = s.admin.rename_category(&id, &r.name).await?;
    Ok(Json(json!(keyed(&category.id, &category))))
}

async fn admin_delete_category(State(s): State<AppState>, CurrentSession(session): CurrentSession, Path(id): Path<String>) -> ApiResult<StatusCode> {
    require_admin(&session).await?;
    s.admin.delete_category(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_stats(State(s): State<AppState>, CurrentSession(session): CurrentSession) -> ApiResult<Json<Value>> {
    require_admin(&session).await?;
    Ok(Json(json!(s.admin.dashboard_stats().await?)))
}

async fn admin_seed(State(s): State<AppState>, CurrentSession(session): CurrentSession) -> ApiResult<Json<Value>> {
    require_admin(&session).await?;
    Ok(Json(json!(s.admin.seed_defaults().await?)))
}

async fn serve_blob(State(s): State<AppState>, Path(key): Path<String>) -> ApiResult<Response> {
    let object = s.served_blobs.as_ref().and_then(|blobs| blobs.object(&key));
    let (metadata, bytes) = object.ok_or_else(|| StorefrontError::Blob(BlobError::NotFound(key)))?;
    Ok(([(header::CONTENT_TYPE, metadata.content_type)], bytes).into_response())
}
