// src/utils/mod.rs
//! Helper functions shared across the service.

pub mod clock;
pub mod crypto;
pub mod serialization;
