// src/contracts/mod.rs
pub mod edu_nft;
