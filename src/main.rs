// src/main.rs

//! # Educational Credential Service - Main Entry Point
//!
//! Wires the issuer, holder wallet and verifier together and starts the API
//! server.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `ChainClient` and the `EduNft` contract binding
//! 2. **Disclosure Layer**: SD-JWT style selectively disclosable credentials
//! 3. **Services Layer**: Issuance, presentation, verification and the HTTP API
//! 4. **Storage Layer**: IPFS for token metadata
//!
//! ## Configuration
//! See [`settings::Settings`]. At minimum `PRIVATE_KEY` must be set, either in
//! the environment, `.env` or `credential-service.toml`.

use crate::blockchain::client::ChainClient;
use crate::contracts::edu_nft::EduNft;
use crate::services::api_server::ApiServer;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::presentation::PresentationBuilder;
use crate::services::verifier::VerificationEngine;
use crate::settings::Settings;
use crate::storage::ipfs_client::IpfsStorage;
use crate::utils::clock::SystemClock;
use crate::wallet::key_management::{KeyManager, MessageSigner};
use anyhow::Context;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod blockchain;    // Chain client and binding oracle
mod contracts;     // EduNFT contract binding
mod disclosure;    // Selective disclosure codec
mod error;         // Error types per layer
mod models;        // Data structures
mod services;      // Business logic and API
mod settings;      // Layered configuration
mod storage;       // IPFS storage layer
mod utils;         // Helper functions
mod wallet;        // Keys and the holder credential store

#[cfg(test)]
mod testing;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load configuration
/// 2. Connect to the chain and IPFS
/// 3. Initialize service components
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("failed to load configuration")?;
    let addr = settings.socket_addr()?;

    let issuer_keys = KeyManager::from_private_key(&settings.private_key)
        .context("PRIVATE_KEY is not a valid secp256k1 key")?;
    let chain_client = ChainClient::connect(&settings.rpc_url, &settings.private_key, settings.mint_timeout())
        .await
        .context("failed to connect to the chain - check RPC_URL")?;
    info!(
        "connected to chain {} as {:?}",
        chain_client.chain_id(),
        chain_client.address()
    );

    let edu_nft = Arc::new(EduNft::new(chain_client)?);
    let ipfs_storage = Arc::new(IpfsStorage::new(&settings.ipfs_api_url, &settings.ipfs_gateway_url)?);
    let clock = Arc::new(SystemClock);

    let credential_issuer = CredentialIssuer::new(
        Arc::new(issuer_keys),
        ipfs_storage.clone(),
        edu_nft.clone(),
        edu_nft.clone(),
        clock.clone(),
    );
    let verifier = VerificationEngine::new(edu_nft, ipfs_storage, clock.clone(), settings.trust_policy);
    info!("verification policy: {:?}", verifier.policy());

    // The holder wallet lives in memory for the lifetime of the process
    let holder = KeyManager::new();
    info!("holder wallet address: {:?}", holder.address());

    let api_server = ApiServer::new(credential_issuer, verifier, PresentationBuilder::new(clock), holder)
        .with_default_contract(&settings.nft_contract_address);

    info!("Available endpoints:");
    info!("- POST   /issue-credential");
    info!("- POST   /import-credential");
    info!("- GET    /credentials");
    info!("- DELETE /credentials");
    info!("- GET    /credentials/:token_id");
    info!("- DELETE /credentials/:token_id");
    info!("- POST   /present");
    info!("- POST   /verify");

    api_server.run(addr).await?;
    Ok(())
}
