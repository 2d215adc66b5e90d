//! Postgres-backed Document Store.
//!
//! Every document (`products/{id}`, `orders/{id}`, ...) is its own JSONB row,
//! so a stock compare-and-set locks one product and an order write touches one
//! row. Writes below a document lock that row with `SELECT ... FOR UPDATE`;
//! writes to a whole collection take the collection's advisory lock
//! exclusively, which document writes hold shared.
//! Subscriptions only observe writes made through this handle, not those of
//! other processes sharing the database.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use super::{tree, DocumentStore, StoreError, Subscription, Watchers};

pub struct PgDocumentStore {
    pool: PgPool,
    watchers: Watchers,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self { Self { pool, watchers: Watchers::default() } }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn load_collection(&self, collection: &str) -> Result<Value, StoreError> {
        let rows: Vec<(String, Json<Value>)> = sqlx::query_as("SELECT key, doc FROM documents WHERE collection = $1")
            .bind(collection).fetch_all(&self.pool).await?;
        Ok(Value::Object(rows.into_iter().map(|(key, Json(doc))| (key, doc)).collect()))
    }

    async fn load_document(&self, collection: &str, key: &str) -> Result<Value, StoreError> {
        let row: Option<(Json<Value>,)> = sqlx::query_as("SELECT doc FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|(Json(doc),)| doc).unwrap_or(Value::Null))
    }

    async fn mutate<T: Send>(&self, path: &str, apply: impl FnOnce(&mut Value, &[&str]) -> Result<T, StoreError> + Send) -> Result<T, StoreError> {
        let segments = tree::segments(path)?;
        match segments.as_slice() {
            [collection] => self.mutate_collection(collection, &segments, apply).await,
            [collection, key, rest @ ..] => self.mutate_document(collection, key, rest, &segments, apply).await,
            [] => Err(StoreError::InvalidPath(path.to_string())),
        }
    }

    async fn mutate_collection<T: Send>(&self, collection: &str, segments: &[&str], apply: impl FnOnce(&mut Value, &[&str]) -> Result<T, StoreError> + Send) -> Result<T, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))").bind(collection).execute(&mut *tx).await?;
        let rows: Vec<(String, Json<Value>)> = sqlx::query_as("SELECT key, doc FROM documents WHERE collection = $1 FOR UPDATE")
            .bind(collection).fetch_all(&mut *tx).await?;
        let mut root = Value::Object(rows.into_iter().map(|(key, Json(doc))| (key, doc)).collect());
        let out = apply(&mut root, &[])?;
        sqlx::query("DELETE FROM documents WHERE collection = $1").bind(collection).execute(&mut *tx).await?;
        let documents = match &root { Value::Object(map) => map.clone(), _ => Map::new() };
        for (key, doc) in documents.into_iter().filter(|(_, doc)| tree::get_at(doc, &[]).is_some()) {
            sqlx::query("INSERT INTO documents (collection, key, doc) VALUES ($1, $2, $3)")
                .bind(collection).bind(key).bind(Json(doc)).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        self.watchers.notify(&root, &[collection], segments);
        Ok(out)
    }

    async fn mutate_document<T: Send>(&self, collection: &str, key: &str, rest: &[&str], segments: &[&str], apply: impl FnOnce(&mut Value, &[&str]) -> Result<T, StoreError> + Send) -> Result<T, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock_shared(hashtext($1))").bind(collection).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO documents (collection, key) VALUES ($1, $2) ON CONFLICT (collection, key) DO NOTHING")
            .bind(collection).bind(key).execute(&mut *tx).await?;
        let (Json(mut doc),): (Json<Value>,) = sqlx::query_as("SELECT doc FROM documents WHERE collection = $1 AND key = $2 FOR UPDATE")
            .bind(collection).bind(key).fetch_one(&mut *tx).await?;
        let out = apply(&mut doc, rest)?;
        write_document(&mut tx, collection, key, &doc).await?;
        tx.commit().await?;
        if self.watchers.watches_above(2, segments) {
            let root = self.load_collection(collection).await?;
            self.watchers.notify(&root, &[collection], segments);
        } else {
            self.watchers.notify(&doc, &[collection, key], segments);
        }
        Ok(out)
    }
}

/// Stores `doc`, or drops the row when nothing is left in it.
async fn write_document(tx: &mut Transaction<'_, Postgres>, collection: &str, key: &str, doc: &Value) -> Result<(), StoreError> {
    if tree::get_at(doc, &[]).is_none() {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2").bind(collection).bind(key).execute(&mut **tx).await?;
    } else {
        sqlx::query("UPDATE documents SET doc = $3, updated_at = NOW() WHERE collection = $1 AND key = $2")
            .bind(collection).bind(key).bind(Json(doc)).execute(&mut **tx).await?;
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = tree::segments(path)?;
        match segments.as_slice() {
            [collection] => Ok(tree::get_at(&self.load_collection(collection).await?, &[]).cloned()),
            [collection, key, rest @ ..] => Ok(tree::get_at(&self.load_document(collection, key).await?, rest).cloned()),
            [] => Ok(None),
        }
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.mutate(path, |root, at| { tree::set_at(root, at, value); Ok(()) }).await
    }

    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        self.mutate(path, |root, at| tree::merge_at(root, at, partial)).await
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.mutate(path, |root, at| { tree::remove_at(root, at); Ok(()) }).await
    }

    async fn compare_and_set(&self, path: &str, expected: Option<&Value>, new: Value) -> Result<bool, StoreError> {
        let expected = expected.cloned();
        self.mutate(path, move |root, at| {
            if tree::get_at(root, at) != expected.as_ref() { return Ok(false); }
            tree::set_at(root, at, new);
            Ok(true)
        }).await
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let current = self.get(path).await?;
        self.watchers.register(path, current)
    }
}
