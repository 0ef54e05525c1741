// src/wallet/credential_storage.rs
//! Credential storage management for the holder wallet.
//!
//! Keeps imported credential export files in memory, grouped by holder
//! address. Every import is verified with the disclosure codec first, so the
//! store only ever contains artifacts whose issuer signature checks out.

use crate::disclosure::DisclosureCodec;
use crate::error::WalletError;
use crate::models::credential::{ClaimSet, CredentialExport, TOKEN_ADDRESS, TOKEN_ID};
use crate::utils::crypto::parse_address;
use ethers::types::Address;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A verified credential as held by the wallet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    /// The export file exactly as imported
    pub credential: CredentialExport,
    /// Every claim recovered from the full artifact
    pub claims: ClaimSet,
    /// Issued-at, seconds since the Unix epoch
    pub issued_at: i64,
}

impl StoredCredential {
    pub fn token_id(&self) -> &str {
        &self.credential.token.token_id
    }
}

/// In-memory credential store keyed by holder address.
pub struct CredentialStorage {
    credentials: HashMap<Address, Vec<StoredCredential>>,
    codec: DisclosureCodec,
}

/// Parses the contents of a credential export file.
pub fn parse_export(json: &str) -> Result<CredentialExport, WalletError> {
    serde_json::from_str(json).map_err(|e| WalletError::InvalidCredential(e.to_string()))
}

impl CredentialStorage {
    /// Creates a new empty CredentialStorage instance.
    pub fn new() -> Self {
        CredentialStorage {
            credentials: HashMap::new(),
            codec: DisclosureCodec::educational(),
        }
    }

    /// Verifies and stores a credential export for `holder`.
    ///
    /// # Behavior
    /// - Rejects exports with an empty artifact or token id
    /// - Rejects artifacts whose signed header disagrees with the export's
    ///   issuer or token coordinates
    /// - Overwrites an existing credential for the same token id
    pub fn import(&mut self, holder: Address, export: CredentialExport) -> Result<StoredCredential, WalletError> {
        if export.sdjwt.trim().is_empty() {
            return Err(WalletError::InvalidCredential("missing sdjwt".into()));
        }
        if export.token.token_id.trim().is_empty() || export.token.address.trim().is_empty() {
            return Err(WalletError::InvalidCredential("missing token".into()));
        }

        let verified = self.codec.verify(&export.sdjwt)?;

        let declared_issuer = parse_address(&export.issuer_address)
            .map_err(|e| WalletError::InvalidCredential(e.to_string()))?;
        if declared_issuer != verified.issuer {
            return Err(WalletError::InvalidCredential(
                "issuerAddress does not match the credential signer".into(),
            ));
        }
        if verified.header_claims.get(TOKEN_ID) != Some(export.token.token_id.as_str()) {
            return Err(WalletError::InvalidCredential(
                "token id does not match the signed credential".into(),
            ));
        }
        let signed_contract = verified
            .header_claims
            .get(TOKEN_ADDRESS)
            .and_then(|value| parse_address(value).ok());
        if signed_contract.is_none() || signed_contract != parse_address(&export.token.address).ok() {
            return Err(WalletError::InvalidCredential(
                "token address does not match the signed credential".into(),
            ));
        }

        let stored = StoredCredential {
            claims: verified.claims(),
            issued_at: verified.issued_at,
            credential: export,
        };
        let held = self.credentials.entry(holder).or_default();
        held.retain(|existing| existing.token_id() != stored.token_id());
        held.push(stored.clone());

        info!("imported credential for token {} into wallet {:?}", stored.token_id(), holder);
        Ok(stored)
    }

    /// Retrieves a credential by token id, across all holders.
    pub fn get(&self, token_id: &str) -> Option<&StoredCredential> {
        self.credentials
            .values()
            .flatten()
            .find(|stored| stored.token_id() == token_id)
    }

    /// Credentials held by one address, in import order.
    pub fn list(&self, holder: Address) -> &[StoredCredential] {
        self.credentials.get(&holder).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the number of stored credentials.
    pub fn count(&self) -> usize {
        self.credentials.values().map(Vec::len).sum()
    }

    /// Removes a holder's credential for `token_id`.
    ///
    /// # Returns
    /// `true` if the credential was present and removed.
    pub fn remove(&mut self, holder: Address, token_id: &str) -> bool {
        match self.credentials.get_mut(&holder) {
            Some(held) => {
                let before = held.len();
                held.retain(|stored| stored.token_id() != token_id);
                held.len() != before
            }
            None => false,
        }
    }

    /// Drops every stored credential.
    pub fn clear(&mut self) {
        self.credentials.clear();
    }
}

impl Default for CredentialStorage {
    fn default() -> Self {
        Self::new()
    }
}
