// src/wallet/mod.rs
//! Holder and issuer wallets.

pub mod credential_storage;
pub mod key_management;
