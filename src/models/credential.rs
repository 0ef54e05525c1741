// src/models/credential.rs
//! Educational credential data model.
//!
//! Defines the claim set that an issuer signs, the identity of the on-chain
//! token a credential is bound to, and the portable export file a holder
//! receives exactly once after issuance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const UNIVERSITY: &str = "university";
pub const ISSUER_ADDRESS: &str = "issuerAddress";
pub const TOKEN_ADDRESS: &str = "tokenAddress";
pub const TOKEN_ID: &str = "tokenId";
pub const NAME: &str = "name";
pub const DEGREE_LEVEL: &str = "degreeLevel";
pub const GRADUATION_YEAR: &str = "graduationYear";
pub const FACULTY: &str = "faculty";

/// Claims embedded in the signed header of every educational credential.
pub const ALWAYS_VISIBLE_CLAIMS: [&str; 4] = [UNIVERSITY, ISSUER_ADDRESS, TOKEN_ADDRESS, TOKEN_ID];

/// Claims the holder may withhold, in canonical display order.
pub const REDACTABLE_CLAIMS: [&str; 4] = [NAME, DEGREE_LEVEL, GRADUATION_YEAR, FACULTY];

/// Subject type written into the credential header.
pub const EDUCATIONAL_CREDENTIAL_TYPE: &str = "EducationalCredential";

/// A set of string claims keyed by claim name.
///
/// Backed by a `BTreeMap` so iteration and serialization order are stable.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ClaimSet(BTreeMap<String, String>);

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy of this set limited to the given names.
    pub fn restricted_to<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> ClaimSet {
        let mut out = ClaimSet::new();
        for name in names {
            if let Some(value) = self.get(name) {
                out.insert(name, value);
            }
        }
        out
    }

    /// Adds every claim of `other`, overwriting duplicates.
    pub fn extend(&mut self, other: &ClaimSet) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }
}

impl FromIterator<(String, String)> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ClaimSet(iter.into_iter().collect())
    }
}

/// Identifies one on-chain NFT.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenIdentity {
    pub chain_id: u64,
    /// Contract address as `0x` hex
    pub address: String,
    /// Decimal `uint256` token id
    pub token_id: String,
}

/// The credential file a holder downloads once after issuance.
///
/// Example:
/// ```json
/// {"issuerAddress":"0x…","token":{"chainId":11155420,"address":"0x…","tokenId":"7"},"sdjwt":"eyJ…~…~"}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialExport {
    pub issuer_address: String,
    pub token: TokenIdentity,
    pub sdjwt: String,
}

/// ERC-721 metadata document published for each credential token.
///
/// `credentialHash` pins the issuer-signed credential; claim values are never
/// published.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hash: Option<String>,
    #[serde(default)]
    pub attributes: Vec<MetadataAttribute>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

/// Position of a claim in [`REDACTABLE_CLAIMS`], used to order disclosed fields.
pub fn canonical_rank(name: &str) -> usize {
    REDACTABLE_CLAIMS
        .iter()
        .position(|claim| *claim == name)
        .unwrap_or(REDACTABLE_CLAIMS.len())
}
