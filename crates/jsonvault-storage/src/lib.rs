//! Concrete storage implementations: a single-file JSON store with optional
//! encryption at rest (PBKDF2 + AES-GCM), plus sources for the store secret.

pub mod hash_provider;
pub mod json_store;
pub mod secret_source;

pub use hash_provider::HashCryptoProvider;
pub use json_store::{JsonStore, KeyState, StoreOptions};
