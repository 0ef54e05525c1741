// src/services/mod.rs
//! Issuer, holder and verifier flows plus the HTTP API that exposes them.

pub mod api_server;
pub mod credential_issuer;
pub mod presentation;
pub mod verifier;
