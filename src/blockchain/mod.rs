// src/blockchain/mod.rs
//! Chain access: the JSON-RPC client and the binding oracle traits.

pub mod client;
pub mod oracle;
