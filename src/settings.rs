// src/settings.rs
//! Service configuration.
//!
//! Values are layered: built-in defaults, then an optional
//! `credential-service.toml` in the working directory, then process
//! environment (`RPC_URL`, `PRIVATE_KEY`, `NFT_CONTRACT_ADDRESS`, ...). `.env`
//! is loaded into the environment by `main` before this runs.

use crate::models::verification::TrustPolicy;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

const CONFIG_FILE: &str = "credential-service";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// JSON-RPC endpoint of the chain the credential NFTs live on
    pub rpc_url: String,
    /// Hex private key of the issuing institution
    pub private_key: String,
    /// Default collection for credentials issued by this service
    pub nft_contract_address: String,
    pub ipfs_api_url: String,
    pub ipfs_gateway_url: String,
    pub bind_address: String,
    pub trust_policy: TrustPolicy,
    /// How long to wait for a mint receipt before checking `ownerOf`
    pub mint_timeout_secs: u64,
}

impl Settings {
    /// Loads settings from the config file and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("rpc_url", "https://sepolia.optimism.io")?
            .set_default("nft_contract_address", "")?
            .set_default("ipfs_api_url", "http://localhost:5001")?
            .set_default("ipfs_gateway_url", "https://ipfs.io")?
            .set_default("bind_address", "127.0.0.1:3000")?
            .set_default("trust_policy", "cryptographic-only")?
            .set_default("mint_timeout_secs", 120)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|e| ConfigError::Message(format!("bind_address {}: {e}", self.bind_address)))
    }

    pub fn mint_timeout(&self) -> Duration {
        Duration::from_secs(self.mint_timeout_secs)
    }
}
