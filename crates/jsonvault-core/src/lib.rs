//! Core abstractions for jsonvault: the store error taxonomy, the mapping
//! delegation contract, and the crypto provider contract consumed by stores.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod crypto;
pub mod encoding;
pub mod storage;
