// src/models/mod.rs
//! Data structures shared by issuer, holder and verifier flows.

pub mod credential;
pub mod presentation;
pub mod verification;
