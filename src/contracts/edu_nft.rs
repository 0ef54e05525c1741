// src/contracts/edu_nft.rs
//! Educational credential NFT contract interface.
//!
//! Wraps the ERC-721 collection each institution deploys. The collection
//! owner is the issuer, `tokenURI` points at the credential metadata and
//! `mint` is the only state-changing call the service makes.

use crate::blockchain::client::ChainClient;
use crate::blockchain::oracle::{BindingOracle, MintReceipt, TokenMinter};
use crate::error::ChainError;
use async_trait::async_trait;
use ethers_core::abi::Abi;
use ethers_core::types::{Address, U256};

const EDU_NFT_ABI: &[u8] = include_bytes!("abi/EduNFT.json");

/// Credential NFT contract wrapper.
///
/// One instance serves any number of collections; the contract address is
/// passed per call.
#[derive(Clone)]
pub struct EduNft {
    client: ChainClient,
    abi: Abi,
}

impl EduNft {
    /// Creates a new EduNft instance over `client`.
    ///
    /// # Errors
    /// Fails if the bundled ABI cannot be parsed.
    pub fn new(client: ChainClient) -> Result<Self, ChainError> {
        let abi = Abi::load(EDU_NFT_ABI).map_err(|e| ChainError::Provider(format!("EduNFT ABI: {e}")))?;
        Ok(EduNft { client, abi })
    }
}

#[async_trait]
impl BindingOracle for EduNft {
    fn chain_id(&self) -> u64 {
        self.client.chain_id()
    }

    async fn owner(&self, contract: Address) -> Result<Address, ChainError> {
        self.client.query_contract(contract, &self.abi, "owner", ()).await
    }

    async fn owner_of(&self, contract: Address, token_id: U256) -> Result<Address, ChainError> {
        self.client
            .query_contract(contract, &self.abi, "ownerOf", (token_id,))
            .await
    }

    async fn token_uri(&self, contract: Address, token_id: U256) -> Result<String, ChainError> {
        self.client
            .query_contract(contract, &self.abi, "tokenURI", (token_id,))
            .await
    }

    async fn name(&self, contract: Address) -> Result<String, ChainError> {
        self.client.query_contract(contract, &self.abi, "name", ()).await
    }
}

#[async_trait]
impl TokenMinter for EduNft {
    /// Mints `token_id` to `to` with metadata at `uri`.
    ///
    /// # Gas Usage
    /// Uses the client's fixed gas limit
    async fn mint(
        &self,
        contract: Address,
        to: Address,
        token_id: U256,
        uri: &str,
    ) -> Result<MintReceipt, ChainError> {
        self.client
            .send_transaction(contract, &self.abi, "mint", (to, token_id, uri.to_string()))
            .await
    }
}
