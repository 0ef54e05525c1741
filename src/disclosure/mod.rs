// src/disclosure/mod.rs
//! Selectively disclosable credential encoding (SD-JWT style).

pub mod codec;
pub mod sd_jwt;

pub use codec::{DisclosureCodec, VerifiedCredential};
pub use sd_jwt::SdJwt;
