//! Blob Store for product images

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Please upload a valid image file (JPEG, PNG, GIF, or WebP), got {0:?}")]
    UnsupportedType(String),
    #[error("Image size should be less than 5MB (got {0} bytes)")]
    TooLarge(usize),
    #[error("Image file is empty")]
    Empty,
    #[error("blob {0:?} not found")]
    NotFound(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub content_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlobRef {
    pub path: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, metadata: BlobMetadata) -> Result<BlobRef, BlobError>;
    async fn download_url(&self, blob: &BlobRef) -> Result<String, BlobError>;
}

/// An image as received from the uploader, checked before it reaches the Blob Store.
#[derive(Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), content_type: content_type.into(), bytes }
    }

    pub fn validate(&self) -> Result<(), BlobError> {
        let mime = self.content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if !IMAGE_TYPES.contains(&mime.as_str()) { return Err(BlobError::UnsupportedType(self.content_type.clone())); }
        if self.bytes.is_empty() { return Err(BlobError::Empty); }
        if self.bytes.len() > MAX_IMAGE_BYTES { return Err(BlobError::TooLarge(self.bytes.len())); }
        Ok(())
    }

    /// `products/{epochMillis}_{name}` with every character outside `[A-Za-z0-9.]` replaced by `_`.
    pub fn object_key(&self, at: DateTime<Utc>) -> String {
        let name: String = self.file_name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' }).collect();
        format!("products/{}_{}", at.timestamp_millis(), name)
    }

    pub fn metadata(&self) -> BlobMetadata { BlobMetadata { content_type: self.content_type.clone() } }
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload").field("file_name", &self.file_name).field("content_type", &self.content_type).field("len", &self.bytes.len()).finish()
    }
}

/// Keeps objects in memory and serves them under `base_url`.
pub struct MemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, (BlobMetadata, Vec<u8>)>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), objects: Mutex::new(HashMap::new()) }
    }

    pub fn object(&self, path: &str) -> Option<(BlobMetadata, Vec<u8>)> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, metadata: BlobMetadata) -> Result<BlobRef, BlobError> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).insert(path.to_string(), (metadata, bytes));
        Ok(BlobRef { path: path.to_string() })
    }

    async fn download_url(&self, blob: &BlobRef) -> Result<String, BlobError> {
        if self.object(&blob.path).is_none() { return Err(BlobError::NotFound(blob.path.clone())); }
        Ok(format!("{}/{}", self.base_url, blob.path))
    }
}

/// Validates `image`, uploads it under a fresh key and returns its public URL.
#[tracing::instrument(skip_all, fields(file = %image.file_name, size = image.bytes.len()))]
pub async fn upload_image(store: &dyn BlobStore, image: ImageUpload) -> Result<String, BlobError> {
    image.validate()?;
    let key = image.object_key(Utc::now());
    let metadata = image.metadata();
    let blob = store.upload(&key, image.bytes, metadata).await?;
    let url = store.download_url(&blob).await?;
    tracing::info!(%url, "image uploaded");
    Ok(url)
}
