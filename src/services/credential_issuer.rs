// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Turns an approved issuance grant into a signed, selectively disclosable
//! credential, publishes its token metadata and mints the bound NFT to the
//! graduate.
//!
//! Issuance is one-shot. A grant produces exactly one artifact, the issuer
//! keeps no copy of it, and the mint is submitted at most once. Failures after
//! the artifact exists are never retried; they are logged for an operator.

use crate::blockchain::oracle::{parse_token_id, BindingOracle, MintReceipt, TokenMinter};
use crate::disclosure::{DisclosureCodec, SdJwt};
use crate::error::IssuanceError;
use crate::models::credential::{
    ClaimSet, CredentialExport, MetadataAttribute, TokenIdentity, TokenMetadata, ISSUER_ADDRESS,
    TOKEN_ADDRESS, TOKEN_ID, UNIVERSITY,
};
use crate::storage::{upload_json, ContentStore};
use crate::utils::clock::Clock;
use crate::utils::crypto::{format_address, parse_address};
use crate::wallet::key_management::MessageSigner;
use ethers::types::{Address, U256};
use log::{error, info, warn};
use rand::rngs::OsRng;
use std::sync::Arc;
use uuid::Uuid;

/// An approved request to issue one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceGrant {
    pub grant_id: String,
    claims: ClaimSet,
    /// Set once the artifact has been produced; never cleared
    issued: bool,
}

impl IssuanceGrant {
    pub fn new(grant_id: impl Into<String>, claims: ClaimSet) -> Self {
        IssuanceGrant {
            grant_id: grant_id.into(),
            claims,
            issued: false,
        }
    }
}

/// The artifact produced by [`CredentialIssuer::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub artifact: SdJwt,
    pub token_id: String,
    /// Contract the token will be minted on, from the `tokenAddress` claim
    pub contract: Address,
    pub content_hash: String,
}

/// Service that issues credentials for one institution.
///
/// Owns the institution's signer and talks to content storage and the NFT
/// contract through their traits.
pub struct CredentialIssuer {
    signer: Arc<dyn MessageSigner>,
    codec: DisclosureCodec,
    store: Arc<dyn ContentStore>,
    oracle: Arc<dyn BindingOracle>,
    minter: Arc<dyn TokenMinter>,
    clock: Arc<dyn Clock>,
}

impl CredentialIssuer {
    pub fn new(
        signer: Arc<dyn MessageSigner>,
        store: Arc<dyn ContentStore>,
        oracle: Arc<dyn BindingOracle>,
        minter: Arc<dyn TokenMinter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CredentialIssuer {
            signer,
            codec: DisclosureCodec::educational(),
            store,
            oracle,
            minter,
            clock,
        }
    }

    /// Address credentials are issued under.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signs the grant's claims into a credential artifact.
    ///
    /// When the claims carry no `tokenId`, a fresh time-ordered id is
    /// generated. The grant is marked issued only when signing succeeds.
    ///
    /// # Errors
    /// - `AlreadyIssued` on a second call for the same grant
    /// - `MissingClaim` / `InvalidClaim` for absent or unparsable header claims
    /// - `IssuerMismatch` when `issuerAddress` is not the signer
    pub fn issue(&self, grant: &mut IssuanceGrant) -> Result<IssuedCredential, IssuanceError> {
        if grant.issued {
            return Err(IssuanceError::AlreadyIssued(grant.grant_id.clone()));
        }

        let mut claims = grant.claims.clone();
        for name in [UNIVERSITY, ISSUER_ADDRESS, TOKEN_ADDRESS] {
            if !claims.contains(name) {
                return Err(IssuanceError::MissingClaim(name.to_string()));
            }
        }
        if !claims.contains(TOKEN_ID) {
            claims.insert(TOKEN_ID, &generate_token_id());
        }

        let claimed = claims.get(ISSUER_ADDRESS).unwrap_or_default();
        let signer = self.signer.address();
        if parse_address(claimed).ok() != Some(signer) {
            return Err(IssuanceError::IssuerMismatch {
                claimed: claimed.to_string(),
                signer: format_address(signer),
            });
        }
        let contract = parse_address(claims.get(TOKEN_ADDRESS).unwrap_or_default()).map_err(|e| {
            IssuanceError::InvalidClaim {
                name: TOKEN_ADDRESS.into(),
                reason: e.to_string(),
            }
        })?;
        let token_id = claims.get(TOKEN_ID).unwrap_or_default().to_string();
        parse_token_id(&token_id).map_err(|e| IssuanceError::InvalidClaim {
            name: TOKEN_ID.into(),
            reason: e.to_string(),
        })?;

        let issued_at = self.clock.now_millis() / 1000;
        let artifact = self
            .codec
            .encode(&claims, issued_at, self.signer.as_ref(), &mut OsRng)?;
        grant.issued = true;

        info!("issued credential for grant {} as token {}", grant.grant_id, token_id);
        Ok(IssuedCredential {
            content_hash: artifact.content_hash(),
            artifact,
            token_id,
            contract,
        })
    }

    /// Uploads token metadata pinning `content_hash`.
    ///
    /// # Returns
    /// The content URI to mint the token with.
    pub async fn publish(
        &self,
        token_id: &str,
        content_hash: &str,
        image_ref: &str,
        contract: Address,
    ) -> Result<String, IssuanceError> {
        let metadata = TokenMetadata {
            name: format!("Educational Credential #{token_id}"),
            description: "Selectively disclosable educational credential. The credential itself is held by the token owner."
                .to_string(),
            image: Some(image_ref.to_string()),
            credential_hash: Some(content_hash.to_string()),
            attributes: vec![
                MetadataAttribute {
                    trait_type: "Issuer".into(),
                    value: format_address(self.address()),
                },
                MetadataAttribute {
                    trait_type: "Contract".into(),
                    value: format_address(contract),
                },
            ],
        };

        upload_json(self.store.as_ref(), &metadata)
            .await
            .map_err(IssuanceError::UploadFailed)
    }

    /// Publishes metadata for an issued credential and mints its token.
    ///
    /// Together with [`issue`](Self::issue) this is the issue-and-mint flow.
    ///
    /// The grant is already consumed at this point, so every failure is
    /// logged at error level for manual follow-up.
    pub async fn deliver(
        &self,
        issued: &IssuedCredential,
        recipient: Address,
        image_ref: &str,
    ) -> Result<CredentialExport, IssuanceError> {
        let result = self.publish_and_mint(issued, recipient, image_ref).await;
        if let Err(e) = &result {
            error!(
                "issuance of token {} to {:?} needs operator intervention: {}",
                issued.token_id, recipient, e
            );
        }
        result
    }

    async fn publish_and_mint(
        &self,
        issued: &IssuedCredential,
        recipient: Address,
        image_ref: &str,
    ) -> Result<CredentialExport, IssuanceError> {
        let sdjwt = issued.artifact.to_string();
        let computed = SdJwt::parse(&sdjwt)?.content_hash();
        if computed != issued.content_hash {
            return Err(IssuanceError::HashMismatch {
                provided: issued.content_hash.clone(),
                computed,
            });
        }

        let uri = self
            .publish(&issued.token_id, &issued.content_hash, image_ref, issued.contract)
            .await?;
        let token_id = parse_token_id(&issued.token_id).map_err(|e| IssuanceError::InvalidClaim {
            name: TOKEN_ID.into(),
            reason: e.to_string(),
        })?;
        self.mint_once(issued.contract, recipient, token_id, &uri).await?;

        Ok(CredentialExport {
            issuer_address: format_address(self.address()),
            token: TokenIdentity {
                chain_id: self.oracle.chain_id(),
                address: format_address(issued.contract),
                token_id: issued.token_id.clone(),
            },
            sdjwt,
        })
    }

    /// Submits the mint exactly once; an unconfirmed outcome is settled by
    /// reading `ownerOf`, never by resubmitting.
    async fn mint_once(
        &self,
        contract: Address,
        recipient: Address,
        token_id: U256,
        uri: &str,
    ) -> Result<(), IssuanceError> {
        match self.minter.mint(contract, recipient, token_id, uri).await {
            Ok(MintReceipt::Confirmed(tx)) => {
                info!("minted token {} to {:?} in {:?}", token_id, recipient, tx);
                Ok(())
            }
            Ok(MintReceipt::Reverted(tx)) => Err(IssuanceError::MintFailed(format!("transaction {tx:?} reverted"))),
            Ok(MintReceipt::Unconfirmed(tx)) => {
                warn!("mint {:?} unconfirmed, checking ownership of token {}", tx, token_id);
                match self.oracle.owner_of(contract, token_id).await {
                    Ok(owner) if owner == recipient => {
                        info!("token {} is owned by {:?}; mint {:?} landed", token_id, recipient, tx);
                        Ok(())
                    }
                    Ok(owner) => Err(IssuanceError::MintFailed(format!(
                        "mint {tx:?} unconfirmed and token {token_id} is owned by {owner:?}"
                    ))),
                    Err(e) => Err(IssuanceError::MintFailed(format!(
                        "mint {tx:?} unconfirmed and ownership unknown: {e}"
                    ))),
                }
            }
            Err(e) => Err(IssuanceError::MintFailed(e.to_string())),
        }
    }
}

/// Process-unique, time-ordered token id as a decimal `uint256`.
fn generate_token_id() -> String {
    Uuid::now_v7().as_u128().to_string()
}
