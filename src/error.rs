// src/error.rs
//! Error types for the credential service.
//!
//! Each layer of the protocol has its own error enum so callers can match on
//! the exact failure without string inspection. Nothing in this crate retries
//! automatically: every variant here is surfaced to the caller as-is.

use thiserror::Error;

/// Failures of the hashing/signing adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("signature recovered {recovered}, expected {expected}")]
    SignerMismatch { expected: String, recovered: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Failures of the selective disclosure codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The artifact is not shaped like a credential or lacks header fields.
    #[error("malformed artifact: {0}")]
    MalformedArtifact(String),

    /// A disclosed tuple does not hash to a commitment in the signed header.
    #[error("commitment mismatch: {0}")]
    CommitmentMismatch(String),

    /// The header signature does not recover to the declared issuer.
    #[error("bad issuer signature: {0}")]
    BadSignature(String),

    #[error("claim set is missing always-visible claim `{0}`")]
    MissingClaim(String),

    #[error("claim `{0}` is neither always-visible nor redactable")]
    UnlistedClaim(String),

    #[error("failed to sign credential header: {0}")]
    Signing(#[from] CryptoError),
}

/// Failures of the content-addressed storage collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("unsupported content uri scheme: {0}")]
    UnsupportedScheme(String),

    #[error("content could not be decoded: {0}")]
    Decode(String),
}

/// Failures of on-chain reads and the mint write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid token id: {0}")]
    InvalidTokenId(String),

    #[error("contract call `{method}` failed: {reason}")]
    Call { method: String, reason: String },

    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A read returned the zero address or an empty string.
    #[error("on-chain value `{0}` is absent")]
    Absent(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Failures of the issuance flow. All of them are terminal.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// The grant already produced its one artifact.
    #[error("credential for grant `{0}` was already issued")]
    AlreadyIssued(String),

    #[error("claim set is missing `{0}`")]
    MissingClaim(String),

    #[error("claim `{name}` is invalid: {reason}")]
    InvalidClaim { name: String, reason: String },

    #[error("issuerAddress claim {claimed} does not match signer {signer}")]
    IssuerMismatch { claimed: String, signer: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("metadata upload failed: {0}")]
    UploadFailed(#[source] StorageError),

    #[error("mint failed: {0}")]
    MintFailed(String),

    #[error("content hash {provided} does not match artifact hash {computed}")]
    HashMismatch { provided: String, computed: String },
}

/// Failures while deriving and signing a presentation envelope.
#[derive(Debug, Error)]
pub enum PresentationError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Signing(#[from] CryptoError),

    #[error("envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the holder's local credential store.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid credential format: {0}")]
    InvalidCredential(String),

    #[error("credential could not be verified: {0}")]
    Unverifiable(#[from] CodecError),

    #[error("no credential stored for token {0}")]
    NotFound(String),
}
