// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! Uses Keccak-256 (Ethereum's standard hash function) for all content hashes
//! and disclosure commitments, and EIP-191 personal-message signatures for
//! every signature in the protocol. Both issuer and holder signatures are
//! therefore checkable against a plain wallet address.

use crate::error::CryptoError;
use ethers::types::{Address, Signature};
use ethers::utils::{hex, keccak256};
use std::str::FromStr;

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Keccak-256 of `data` rendered as a `0x`-prefixed lowercase hex string.
///
/// This is the form in which content hashes are written into token metadata.
pub fn hash_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(hash_data(data)))
}

/// Parses a hex address, with or without the `0x` prefix.
pub fn parse_address(value: &str) -> Result<Address, CryptoError> {
    Address::from_str(value.trim()).map_err(|e| CryptoError::InvalidAddress(format!("{value}: {e}")))
}

/// Formats an address as lowercase `0x` hex.
pub fn format_address(addr: Address) -> String {
    format!("{:?}", addr)
}

/// Parses a hex-encoded 65-byte `r || s || v` signature.
pub fn parse_signature(value: &str) -> Result<Signature, CryptoError> {
    Signature::from_str(value.trim()).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

/// Encodes a signature as `0x`-prefixed hex.
pub fn format_signature(signature: &Signature) -> String {
    format!("0x{}", signature)
}

/// Recovers the address that produced an EIP-191 signature over `message`.
pub fn recover_signer(message: &[u8], signature: &Signature) -> Result<Address, CryptoError> {
    signature
        .recover(message)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

/// Checks that `signature` over `message` was produced by `expected`.
///
/// # Errors
/// - `InvalidSignature` if the signature cannot be recovered at all
/// - `SignerMismatch` if it recovers to a different address
pub fn verify_message(
    message: &[u8],
    signature: &Signature,
    expected: Address,
) -> Result<(), CryptoError> {
    let recovered = recover_signer(message, signature)?;
    if recovered != expected {
        return Err(CryptoError::SignerMismatch {
            expected: format_address(expected),
            recovered: format_address(recovered),
        });
    }
    Ok(())
}
