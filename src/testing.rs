// src/testing.rs
//! In-memory collaborators and credential fixtures shared by unit tests.

use crate::blockchain::oracle::{BindingOracle, MintReceipt, TokenMinter};
use crate::disclosure::{DisclosureCodec, SdJwt};
use crate::error::{ChainError, StorageError};
use crate::models::credential::*;
use crate::storage::ContentStore;
use crate::utils::crypto::format_address;
use crate::wallet::key_management::{KeyManager, MessageSigner};
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const TOKEN_CONTRACT: &str = "0x00000000000000000000000000000000000000aa";
pub const CHAIN_ID: u64 = 11155420;
pub const ISSUED_AT: i64 = 1_700_000_000;

pub fn token_contract() -> Address {
    TOKEN_CONTRACT.parse().unwrap()
}

/// Full claim set for Alice's BSc, issued by `issuer`.
pub fn claims_for(issuer: &KeyManager, token_id: &str) -> ClaimSet {
    ClaimSet::new()
        .with(UNIVERSITY, "X")
        .with(NAME, "Alice")
        .with(DEGREE_LEVEL, "BSc")
        .with(GRADUATION_YEAR, "2024")
        .with(FACULTY, "CS")
        .with(ISSUER_ADDRESS, &format_address(issuer.address()))
        .with(TOKEN_ADDRESS, TOKEN_CONTRACT)
        .with(TOKEN_ID, token_id)
}

pub fn artifact_for(issuer: &KeyManager, token_id: &str) -> SdJwt {
    let mut rng = StdRng::seed_from_u64(token_id.len() as u64);
    DisclosureCodec::educational()
        .encode(&claims_for(issuer, token_id), ISSUED_AT, issuer, &mut rng)
        .unwrap()
}

pub fn export_for(issuer: &KeyManager, token_id: &str) -> CredentialExport {
    CredentialExport {
        issuer_address: format_address(issuer.address()),
        token: TokenIdentity {
            chain_id: CHAIN_ID,
            address: TOKEN_CONTRACT.to_string(),
            token_id: token_id.to_string(),
        },
        sdjwt: artifact_for(issuer, token_id).to_string(),
    }
}

/// How [`MemoryChain`] answers a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintBehavior {
    Confirm,
    Revert,
    /// No receipt; `applied` says whether the token exists afterwards.
    DropReceipt { applied: bool },
    Fail,
}

/// A single collection living in memory.
pub struct MemoryChain {
    collection_owner: Address,
    chain_id: u64,
    tokens: Mutex<HashMap<U256, (Address, String)>>,
    unreachable: AtomicBool,
    mint_behavior: Mutex<MintBehavior>,
    mint_calls: AtomicUsize,
}

impl MemoryChain {
    pub fn new(collection_owner: Address) -> Self {
        MemoryChain {
            collection_owner,
            chain_id: CHAIN_ID,
            tokens: Mutex::new(HashMap::new()),
            unreachable: AtomicBool::new(false),
            mint_behavior: Mutex::new(MintBehavior::Confirm),
            mint_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_token(&self, token_id: U256, holder: Address, uri: &str) {
        self.tokens.lock().unwrap().insert(token_id, (holder, uri.to_string()));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_mint_behavior(&self, behavior: MintBehavior) {
        *self.mint_behavior.lock().unwrap() = behavior;
    }

    pub fn mint_calls(&self) -> usize {
        self.mint_calls.load(Ordering::SeqCst)
    }

    pub fn token(&self, token_id: U256) -> Option<(Address, String)> {
        self.tokens.lock().unwrap().get(&token_id).cloned()
    }

    fn reachable(&self) -> Result<(), ChainError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ChainError::Provider("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BindingOracle for MemoryChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn owner(&self, _contract: Address) -> Result<Address, ChainError> {
        self.reachable()?;
        Ok(self.collection_owner)
    }

    async fn owner_of(&self, _contract: Address, token_id: U256) -> Result<Address, ChainError> {
        self.reachable()?;
        self.token(token_id).map(|(holder, _)| holder).ok_or_else(|| ChainError::Call {
            method: "ownerOf".into(),
            reason: "ERC721NonexistentToken".into(),
        })
    }

    async fn token_uri(&self, _contract: Address, token_id: U256) -> Result<String, ChainError> {
        self.reachable()?;
        self.token(token_id).map(|(_, uri)| uri).ok_or_else(|| ChainError::Call {
            method: "tokenURI".into(),
            reason: "ERC721NonexistentToken".into(),
        })
    }

    async fn name(&self, _contract: Address) -> Result<String, ChainError> {
        self.reachable()?;
        Ok("X University Diplomas".into())
    }
}

#[async_trait]
impl TokenMinter for MemoryChain {
    async fn mint(&self, _contract: Address, to: Address, token_id: U256, uri: &str) -> Result<MintReceipt, ChainError> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.mint_behavior.lock().unwrap();
        let tx = H256::from_low_u64_be(self.mint_calls() as u64);
        match behavior {
            MintBehavior::Confirm => {
                self.set_token(token_id, to, uri);
                Ok(MintReceipt::Confirmed(tx))
            }
            MintBehavior::Revert => Ok(MintReceipt::Reverted(tx)),
            MintBehavior::DropReceipt { applied } => {
                if applied {
                    self.set_token(token_id, to, uri);
                }
                Ok(MintReceipt::Unconfirmed(tx))
            }
            MintBehavior::Fail => Err(ChainError::Transaction("nonce too low".into())),
        }
    }
}

/// Content store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, uri: &str, data: &[u8]) {
        self.documents.lock().unwrap().insert(uri.to_string(), data.to_vec());
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.documents.lock().unwrap().get(uri).cloned()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn upload(&self, data: Vec<u8>) -> Result<String, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("node unavailable".into()));
        }
        let mut documents = self.documents.lock().unwrap();
        let uri = format!("ipfs://QmMemory{}", documents.len());
        documents.insert(uri.clone(), data);
        Ok(uri)
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        self.get(uri)
            .ok_or_else(|| StorageError::Download(format!("{uri} not found")))
    }

    fn resolve_scheme(&self, uri: &str) -> Result<String, StorageError> {
        match uri.strip_prefix("ipfs://") {
            Some(cid) => Ok(format!("https://gateway.test/ipfs/{cid}")),
            None if uri.starts_with("https://") => Ok(uri.to_string()),
            None => Err(StorageError::UnsupportedScheme(uri.to_string())),
        }
    }
}
