// src/storage/mod.rs
//! Content-addressed storage for credential metadata.

pub mod ipfs_client;

use crate::error::StorageError;
use crate::utils::serialization::serialize;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A store keyed by a digest of the content it holds.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `data` and returns its content URI (e.g. `ipfs://<cid>`).
    async fn upload(&self, data: Vec<u8>) -> Result<String, StorageError>;

    /// Fetches the bytes behind a content URI.
    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError>;

    /// Maps a content URI to a URL a browser can load.
    fn resolve_scheme(&self, uri: &str) -> Result<String, StorageError>;
}

/// Serializes `value` as JSON and uploads it.
pub async fn upload_json<T: Serialize + Sync>(store: &dyn ContentStore, value: &T) -> Result<String, StorageError> {
    let json = serialize(value).map_err(|e| StorageError::Upload(format!("serialization: {e}")))?;
    store.upload(json.into_bytes()).await
}

/// Downloads and deserializes a JSON document.
pub async fn download_json<T: DeserializeOwned>(store: &dyn ContentStore, uri: &str) -> Result<T, StorageError> {
    let bytes = store.download(uri).await?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::Decode(e.to_string()))
}
