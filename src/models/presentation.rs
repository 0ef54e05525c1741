// src/models/presentation.rs
//! Presentation envelope exchanged between holder and verifier.
//!
//! The serialized envelope is the QR transport payload. Its key names are part
//! of the wire format, including the historical `presantation` spelling.

use crate::models::credential::TokenIdentity;
use serde::{Deserialize, Serialize};

/// Token coordinates a holder may attach so the verifier can check ownership.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    pub token_id: String,
    pub chain_id: u64,
}

impl From<TokenIdentity> for TokenInfo {
    fn from(token: TokenIdentity) -> Self {
        TokenInfo {
            address: token.address,
            token_id: token.token_id,
            chain_id: token.chain_id,
        }
    }
}

/// A time-stamped, holder-signed wrapper around a derived credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresentationEnvelope {
    /// Holder address the signature must recover to
    pub student_address: String,

    /// Derived (partially disclosed) credential artifact
    #[serde(rename = "presantation")]
    pub presentation: String,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Hex-encoded EIP-191 signature over [`EnvelopeBody`]
    pub signature: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_info: Option<TokenInfo>,
}

/// The signed portion of an envelope: everything except the signature.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeBody<'a> {
    pub student_address: &'a str,
    #[serde(rename = "presantation")]
    pub presentation: &'a str,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_info: Option<&'a TokenInfo>,
}

impl EnvelopeBody<'_> {
    /// Canonical bytes the holder signs and the verifier re-derives.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl PresentationEnvelope {
    pub fn body(&self) -> EnvelopeBody<'_> {
        EnvelopeBody {
            student_address: &self.student_address,
            presentation: &self.presentation,
            timestamp: self.timestamp,
            token_info: self.token_info.as_ref(),
        }
    }
}
