// src/blockchain/client.rs
//! EVM JSON-RPC client implementation.
//!
//! Provides a high-level interface for contract reads and signed contract
//! transactions against any EVM chain reachable over HTTP.

use crate::blockchain::oracle::MintReceipt;
use crate::error::ChainError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers_contract::{BaseContract, Contract};
use ethers_core::{
    abi::{Abi, Detokenize, Tokenize},
    types::{Address, H256, U256, U64},
};
use log::{debug, warn};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Gas limit for contract writes.
const GAS_LIMIT: u64 = 3_000_000;

type SignerClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// Blockchain client for managing wallet and contract interactions.
///
/// This client provides:
/// - Read-only contract calls through the plain provider
/// - Signed transactions through a signer middleware
/// - A bounded wait for transaction receipts
#[derive(Clone)]
pub struct ChainClient {
    /// JSON-RPC provider
    provider: Arc<Provider<Http>>,
    /// Provider wrapped with the issuer's signing wallet
    signer: Arc<SignerClient>,
    chain_id: u64,
    receipt_timeout: Duration,
}

impl ChainClient {
    /// Connects to `rpc_url` and binds `private_key` to the reported chain id.
    ///
    /// # Errors
    /// Returns error if:
    /// - The RPC URL is invalid or unreachable
    /// - The private key is invalid
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        receipt_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Provider(format!("invalid RPC url {rpc_url}: {e}")))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?
            .as_u64();
        let wallet = LocalWallet::from_str(private_key.trim())
            .map_err(|e| ChainError::Provider(format!("invalid private key: {e}")))?
            .with_chain_id(chain_id);

        debug!("connected to chain {} at {}", chain_id, rpc_url);
        Ok(Self::from_parts(provider, wallet, receipt_timeout))
    }

    /// Builds a client without touching the network; the chain id is taken
    /// from the wallet.
    pub fn from_parts(provider: Provider<Http>, wallet: LocalWallet, receipt_timeout: Duration) -> Self {
        let provider = Arc::new(provider);
        let chain_id = wallet.chain_id();
        let signer = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        ChainClient {
            provider,
            signer,
            chain_id,
            receipt_timeout,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Gets the signing wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Queries a smart contract (read-only operation).
    ///
    /// # Errors
    /// `ChainError::Call` if the method is unknown, the call reverts or the
    /// return value cannot be decoded.
    pub async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, ChainError> {
        let contract = Contract::new(contract_address, BaseContract::from(abi.clone()), self.provider.clone());

        contract
            .method::<_, R>(method, params)
            .map_err(|e| call_error(method, e))?
            .call()
            .await
            .map_err(|e| call_error(method, e))
    }

    /// Sends a transaction to a smart contract and waits a bounded time for
    /// its receipt.
    ///
    /// Once the transaction is submitted this never returns an error: a late
    /// or missing receipt is reported as [`MintReceipt::Unconfirmed`] so the
    /// caller can consult chain state instead of resubmitting.
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<MintReceipt, ChainError> {
        let contract = Contract::new(contract_address, BaseContract::from(abi.clone()), self.signer.clone());

        let call = contract
            .method::<_, H256>(method, params)
            .map_err(|e| call_error(method, e))?
            .gas(U256::from(GAS_LIMIT));
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::Transaction(format!("{method}: {e}")))?;
        let tx_hash = pending.tx_hash();
        debug!("submitted {} transaction {:?}", method, tx_hash);

        match tokio::time::timeout(self.receipt_timeout, pending).await {
            Ok(Ok(Some(receipt))) if receipt.status == Some(U64::from(1)) => Ok(MintReceipt::Confirmed(tx_hash)),
            Ok(Ok(Some(_))) => Ok(MintReceipt::Reverted(tx_hash)),
            Ok(Ok(None)) => {
                warn!("transaction {:?} dropped from the mempool", tx_hash);
                Ok(MintReceipt::Unconfirmed(tx_hash))
            }
            Ok(Err(e)) => {
                warn!("lost track of transaction {:?}: {}", tx_hash, e);
                Ok(MintReceipt::Unconfirmed(tx_hash))
            }
            Err(_) => {
                warn!(
                    "no receipt for transaction {:?} within {}s",
                    tx_hash,
                    self.receipt_timeout.as_secs()
                );
                Ok(MintReceipt::Unconfirmed(tx_hash))
            }
        }
    }
}

fn call_error(method: &str, err: impl std::fmt::Display) -> ChainError {
    ChainError::Call {
        method: method.to_string(),
        reason: err.to_string(),
    }
}
