// src/disclosure/sd_jwt.rs
//! Wire representation of selectively disclosable credentials.
//!
//! An artifact is serialized in SD-JWT compact form:
//!
//! ```text
//! <b64url(header)>.<b64url(payload)>.<b64url(signature)>~<disclosure>~<disclosure>~
//! ```
//!
//! The issuer-signed JWT carries the always-visible claims and one digest per
//! redactable claim. Each disclosure is `b64url(json([salt, name, value]))` and
//! its digest is `b64url(keccak256(disclosure))`. The JWT signature is an
//! EIP-191 personal-message signature over `header.payload`, so it can be
//! checked against the issuer's wallet address.

use crate::error::CodecError;
use crate::models::credential::ClaimSet;
use crate::utils::crypto::{hash_data, hash_hex};
use crate::utils::serialization::{b64url_encode, decode_json_segment, encode_json_segment};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JWS algorithm label for recoverable secp256k1 personal-message signatures.
pub const JWT_ALG: &str = "ES256K-R";
pub const JWT_TYP: &str = "sd+jwt";
/// Digest algorithm recorded in `_sd_alg`.
pub const SD_ALG: &str = "keccak-256";

const SEPARATOR: char = '~';

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

impl JwtHeader {
    pub fn credential() -> Self {
        JwtHeader {
            alg: JWT_ALG.to_string(),
            typ: JWT_TYP.to_string(),
        }
    }
}

/// Non-redactable payload of the issuer-signed JWT.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialHeader {
    /// Issuer wallet address
    pub iss: String,

    #[serde(rename = "type")]
    pub subject_type: String,

    /// Issued-at, seconds since the Unix epoch
    pub iat: i64,

    /// Commitments to the redactable claims, sorted
    #[serde(rename = "_sd")]
    pub digests: Vec<String>,

    #[serde(rename = "_sd_alg")]
    pub digest_alg: String,

    /// Always-visible claims
    #[serde(flatten)]
    pub claims: ClaimSet,
}

/// One disclosable `(salt, name, value)` tuple together with its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclosure {
    pub salt: String,
    pub name: String,
    pub value: String,
    encoded: String,
}

impl Disclosure {
    pub fn new(salt: &str, name: &str, value: &str) -> Result<Self, CodecError> {
        let encoded = encode_json_segment(&(salt, name, value))
            .map_err(|e| CodecError::MalformedArtifact(format!("disclosure encoding: {e}")))?;
        Ok(Disclosure {
            salt: salt.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            encoded,
        })
    }

    /// Decodes a transmitted disclosure segment.
    pub fn parse(encoded: &str) -> Result<Self, CodecError> {
        let (salt, name, value): (String, String, String) = decode_json_segment(encoded)
            .map_err(|e| CodecError::MalformedArtifact(format!("disclosure: {e}")))?;
        Ok(Disclosure {
            salt,
            name,
            value,
            encoded: encoded.to_string(),
        })
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn digest(&self) -> String {
        disclosure_digest(&self.encoded)
    }
}

/// Commitment for a disclosure segment exactly as transmitted.
pub fn disclosure_digest(encoded: &str) -> String {
    b64url_encode(&hash_data(encoded.as_bytes()))
}

/// A parsed (but not yet verified) compact SD-JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdJwt {
    jwt: String,
    disclosures: Vec<String>,
}

impl SdJwt {
    pub(crate) fn from_parts(jwt: String, disclosures: Vec<String>) -> Self {
        SdJwt { jwt, disclosures }
    }

    /// Splits a compact serialization into its JWT and disclosure segments.
    pub fn parse(serialized: &str) -> Result<Self, CodecError> {
        let serialized = serialized.trim();
        let mut parts = serialized.split(SEPARATOR);
        let jwt = parts.next().unwrap_or_default();
        if jwt.split('.').count() != 3 || jwt.split('.').any(str::is_empty) {
            return Err(CodecError::MalformedArtifact(
                "issuer-signed part is not a three-segment JWT".into(),
            ));
        }

        let mut segments: Vec<&str> = parts.collect();
        // The serialization ends with a separator, leaving one empty tail
        if segments.last() == Some(&"") {
            segments.pop();
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(CodecError::MalformedArtifact("empty disclosure segment".into()));
        }

        Ok(SdJwt {
            jwt: jwt.to_string(),
            disclosures: segments.into_iter().map(str::to_string).collect(),
        })
    }

    /// The issuer-signed JWT without any disclosures.
    pub fn issuer_jwt(&self) -> &str {
        &self.jwt
    }

    pub fn disclosures(&self) -> &[String] {
        &self.disclosures
    }

    /// Hash of the issuer-signed part.
    ///
    /// Stable across every presentation derived from the same credential,
    /// which is what lets token metadata pin it.
    pub fn content_hash(&self) -> String {
        hash_hex(self.issuer_jwt().as_bytes())
    }

    /// Same issuer-signed JWT with a different disclosure list.
    pub fn with_disclosures(&self, disclosures: Vec<String>) -> SdJwt {
        SdJwt {
            jwt: self.jwt.clone(),
            disclosures,
        }
    }

    fn segments(&self) -> (&str, &str, &str) {
        let mut parts = self.jwt.splitn(3, '.');
        let header = parts.next().unwrap_or_default();
        let payload = parts.next().unwrap_or_default();
        let signature = parts.next().unwrap_or_default();
        (header, payload, signature)
    }

    /// `header.payload`, the bytes covered by the issuer signature.
    pub fn signing_input(&self) -> &str {
        match self.jwt.rfind('.') {
            Some(idx) => &self.jwt[..idx],
            None => &self.jwt,
        }
    }

    pub fn signature_segment(&self) -> &str {
        self.segments().2
    }

    pub fn jwt_header(&self) -> Result<JwtHeader, CodecError> {
        decode_json_segment(self.segments().0)
            .map_err(|e| CodecError::MalformedArtifact(format!("JWT header: {e}")))
    }

    /// Decodes the payload without checking the signature.
    pub fn header(&self) -> Result<CredentialHeader, CodecError> {
        decode_json_segment(self.segments().1)
            .map_err(|e| CodecError::MalformedArtifact(format!("JWT payload: {e}")))
    }
}

impl fmt::Display for SdJwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.jwt, SEPARATOR)?;
        for disclosure in &self.disclosures {
            write!(f, "{}{}", disclosure, SEPARATOR)?;
        }
        Ok(())
    }
}
