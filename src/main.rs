//! OpenSASE Storefront - cart, checkout and inventory reservation service

use anyhow::Result;
use opensase_storefront::api::{self, AppState};
use opensase_storefront::auth::DocumentCredentials;
use opensase_storefront::blob::MemoryBlobStore;
use opensase_storefront::config::Config;
use opensase_storefront::domain::events::{EventPublisher, LogPublisher, NatsPublisher};
use opensase_storefront::store::{DocumentStore, MemoryStore, PgDocumentStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            let store = PgDocumentStore::connect(url).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, documents are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, events go to the log only"); Arc::new(LogPublisher) }
        },
        None => Arc::new(LogPublisher),
    };
    let blobs = Arc::new(MemoryBlobStore::new(&config.blob_base_url));

    let state = AppState::new(store.clone(), Arc::new(DocumentCredentials::new(store)), blobs.clone(), publisher)
        .with_retry_limit(config.stock_retry_limit)
        .with_admin_email(config.admin_email.clone())
        .with_session_limits(config.session_idle, config.max_sessions)
        .serving_blobs(blobs);
    if config.seed_catalog {
        let seeded = state.admin.seed_defaults().await?;
        tracing::info!(categories = seeded.categories, products = seeded.products, "seed finished");
    }
    let _catalog_watch = state.catalog.watch().await?;

    tracing::info!("🚀 OpenSASE Storefront listening on {}", config.bind_addr());
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr()).await?, api::router(state)).await?;
    Ok(())
}
