// src/wallet/key_management.rs
//! Cryptographic key management for credential wallets.
//!
//! Provides the signing half of the hasher/signer adapter. Issuers sign
//! credential headers and holders sign presentation envelopes through the same
//! [`MessageSigner`] interface, so the codec never touches key material.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - EIP-191 personal-message hashing (via `ethers` crate)
//! - Cryptographically secure random number generation

use crate::error::{CryptoError, WalletError};
use crate::models::credential::CredentialExport;
use crate::wallet::credential_storage::{CredentialStorage, StoredCredential};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use ethers::utils::hash_message;
use k256::ecdsa::SigningKey;
use rand::{CryptoRng, RngCore};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Anything able to produce EIP-191 signatures for a fixed address.
pub trait MessageSigner: Send + Sync {
    /// Address that signatures from this signer recover to.
    fn address(&self) -> Address;

    /// Signs `message` as an Ethereum personal message.
    fn sign_message(&self, message: &[u8]) -> Result<Signature, CryptoError>;
}

/// Key management for a single wallet identity.
///
/// This struct provides:
/// - Key generation or import from a hex private key
/// - EIP-191 message signing
/// - The holder's local credential store, shared across clones
///
/// # Security Notes
/// - Secret keys are never exposed publicly
/// - Uses cryptographically secure random number generation
#[derive(Clone)]
pub struct KeyManager {
    /// Wallet holding the secp256k1 signing key
    wallet: LocalWallet,

    credential_storage: Arc<Mutex<CredentialStorage>>,
}

impl KeyManager {
    /// Generates a new KeyManager with a fresh secp256k1 key from the thread RNG.
    pub fn new() -> Self {
        Self::from_rng(&mut rand::thread_rng())
    }

    /// Generates a key from the supplied CSPRNG.
    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_wallet(LocalWallet::from(SigningKey::random(rng)))
    }

    /// Imports a hex-encoded private key (with or without `0x`).
    pub fn from_private_key(private_key: &str) -> Result<Self, CryptoError> {
        let wallet = LocalWallet::from_str(private_key.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self::from_wallet(wallet))
    }

    /// Deterministic key for tests, drawn from a seeded CSPRNG.
    #[cfg(test)]
    pub fn from_seed(seed: u64) -> Self {
        use rand::SeedableRng;
        Self::from_rng(&mut rand::rngs::StdRng::seed_from_u64(seed))
    }

    fn from_wallet(wallet: LocalWallet) -> Self {
        KeyManager {
            wallet,
            credential_storage: Arc::new(Mutex::new(CredentialStorage::new())),
        }
    }

    fn storage(&self) -> MutexGuard<'_, CredentialStorage> {
        self.credential_storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Imports a credential export file into this wallet's store.
    ///
    /// The artifact is fully re-verified before it is accepted; the stored
    /// entry carries the recovered claims.
    pub fn import_credential(&self, export: CredentialExport) -> Result<StoredCredential, WalletError> {
        let holder = self.address();
        self.storage().import(holder, export)
    }

    /// Looks a credential up by its token id.
    pub fn get_credential(&self, token_id: &str) -> Option<StoredCredential> {
        self.storage().get(token_id).cloned()
    }

    /// Every credential held by this wallet.
    pub fn credentials(&self) -> Vec<StoredCredential> {
        self.storage().list(self.address()).to_vec()
    }

    /// Returns the count of credentials currently stored in the wallet.
    pub fn credential_count(&self) -> usize {
        self.storage().count()
    }

    /// Removes a credential from the wallet.
    /// Returns true if a credential was removed, false if no matching token was found.
    pub fn remove_credential(&self, token_id: &str) -> bool {
        let holder = self.address();
        self.storage().remove(holder, token_id)
    }

    /// Empties the wallet's credential store.
    pub fn clear_credentials(&self) {
        self.storage().clear();
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSigner for KeyManager {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs a message using ECDSA (secp256k1) over its EIP-191 digest.
    ///
    /// # Returns
    /// 65-byte recoverable signature (r || s || v)
    fn sign_message(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        self.wallet
            .sign_hash(hash_message(message))
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
