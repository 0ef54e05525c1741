// src/storage/ipfs_client.rs
//! IPFS storage client for credential metadata.
//!
//! Uploads go through an IPFS node's HTTP API; downloads go through a public
//! HTTP gateway so the verifier never needs a node of its own.
//!
//! # Security Considerations
//! - All stored data is public (IPFS is a public network)
//! - Metadata holds only the content hash, never claim values

use crate::error::StorageError;
use crate::storage::ContentStore;
use async_trait::async_trait;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;
use url::Url;

const IPFS_SCHEME: &str = "ipfs://";

/// IPFS node client paired with an HTTP gateway.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS API client instance
    client: Arc<IpfsClient>,
    http: reqwest::Client,
    /// Gateway base URL without a trailing slash
    gateway: String,
}

impl IpfsStorage {
    /// Creates a client for the IPFS API at `api_url` and the gateway at
    /// `gateway_url` (e.g. `https://ipfs.io`).
    pub fn new(api_url: &str, gateway_url: &str) -> Result<Self, StorageError> {
        let client = IpfsClient::from_str(api_url)
            .map_err(|e| StorageError::Upload(format!("invalid IPFS API url {api_url}: {e}")))?;
        let gateway = Url::parse(gateway_url)
            .map_err(|e| StorageError::Download(format!("invalid gateway url {gateway_url}: {e}")))?;

        Ok(IpfsStorage {
            client: Arc::new(client),
            http: reqwest::Client::new(),
            gateway: gateway.as_str().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for IpfsStorage {
    /// Stores raw binary data in IPFS.
    ///
    /// # Returns
    /// `ipfs://<cid>` of the stored data
    async fn upload(&self, data: Vec<u8>) -> Result<String, StorageError> {
        let client = self.client.clone();

        // The hyper backend's futures are not Send; drive them on a dedicated runtime
        let res = task::spawn_blocking(move || -> Result<String, StorageError> {
            let rt = tokio::runtime::Runtime::new().map_err(|e| StorageError::Upload(e.to_string()))?;
            rt.block_on(async {
                let response = client
                    .add(Cursor::new(data))
                    .await
                    .map_err(|e| StorageError::Upload(e.to_string()))?;
                Ok(response.hash)
            })
        })
        .await;

        match res {
            Ok(inner) => {
                let cid = inner?;
                debug!("stored {} on IPFS", cid);
                Ok(format!("{IPFS_SCHEME}{cid}"))
            }
            Err(join_err) => Err(StorageError::Upload(join_err.to_string())),
        }
    }

    /// Retrieves data behind an `ipfs://` or `http(s)://` URI via the gateway.
    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.resolve_scheme(uri)?;
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| StorageError::Download(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;
        Ok(body.to_vec())
    }

    fn resolve_scheme(&self, uri: &str) -> Result<String, StorageError> {
        let uri = uri.trim();
        if let Some(path) = uri.strip_prefix(IPFS_SCHEME) {
            let path = path.trim_start_matches("ipfs/");
            if path.is_empty() {
                return Err(StorageError::UnsupportedScheme(uri.to_string()));
            }
            return Ok(format!("{}/ipfs/{}", self.gateway, path));
        }
        match Url::parse(uri) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(uri.to_string()),
            _ => Err(StorageError::UnsupportedScheme(uri.to_string())),
        }
    }
}
