// src/blockchain/oracle.rs
//! On-chain binding oracle.
//!
//! The verifier trusts the chain, never the presenter, for three facts about a
//! credential token: who issued the collection (`owner()`), who holds the
//! token now (`ownerOf`) and where its metadata lives (`tokenURI`). The only
//! write in the protocol is the issuer's `mint`.

use crate::error::ChainError;
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};

/// Read-only view of an ERC-721 credential collection.
#[async_trait]
pub trait BindingOracle: Send + Sync {
    /// Chain the oracle reads from.
    fn chain_id(&self) -> u64;

    /// Collection owner, i.e. the issuing institution.
    async fn owner(&self, contract: Address) -> Result<Address, ChainError>;

    async fn owner_of(&self, contract: Address, token_id: U256) -> Result<Address, ChainError>;

    async fn token_uri(&self, contract: Address, token_id: U256) -> Result<String, ChainError>;

    /// Collection display name.
    async fn name(&self, contract: Address) -> Result<String, ChainError>;
}

/// Outcome of a submitted mint transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintReceipt {
    Confirmed(H256),
    Reverted(H256),
    /// Submitted, but no receipt arrived in time.
    Unconfirmed(H256),
}

/// The single on-chain write.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint(
        &self,
        contract: Address,
        to: Address,
        token_id: U256,
        uri: &str,
    ) -> Result<MintReceipt, ChainError>;
}

/// Issuer, holder and content pointer of one token, read together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainBinding {
    pub issuer: Address,
    pub holder: Address,
    pub content_uri: String,
}

/// Reads the three binding facts concurrently.
///
/// Any failed read fails the whole binding; so does a zero address or an
/// empty token URI.
pub async fn read_binding(
    oracle: &dyn BindingOracle,
    contract: Address,
    token_id: U256,
) -> Result<OnChainBinding, ChainError> {
    let (issuer, holder, content_uri) = tokio::try_join!(
        oracle.owner(contract),
        oracle.owner_of(contract, token_id),
        oracle.token_uri(contract, token_id),
    )?;

    if issuer.is_zero() {
        return Err(ChainError::Absent("owner".into()));
    }
    if holder.is_zero() {
        return Err(ChainError::Absent("ownerOf".into()));
    }
    if content_uri.trim().is_empty() {
        return Err(ChainError::Absent("tokenURI".into()));
    }

    Ok(OnChainBinding {
        issuer,
        holder,
        content_uri,
    })
}

/// Parses a decimal `uint256` token id.
pub fn parse_token_id(value: &str) -> Result<U256, ChainError> {
    let digits = value.trim();
    if digits.is_empty() {
        return Err(ChainError::InvalidTokenId("empty token id".into()));
    }
    U256::from_dec_str(digits).map_err(|e| ChainError::InvalidTokenId(format!("{value}: {e}")))
}
