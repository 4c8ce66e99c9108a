use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors produced by file-backed stores and their mapping surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Data file does not exist and creation was not allowed.
    #[error("data file not found: {}", path.display())]
    NotFound { path: PathBuf },
    /// Data path exists but is not a regular file.
    #[error("data path is not a regular file: {}", path.display())]
    InvalidTarget { path: PathBuf },
    /// Operation requires a successful `load` first.
    #[error("store must be loaded first")]
    NotLoaded,
    /// Stored content could not be decoded or parsed.
    #[error("corrupt content in {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    /// Secret does not verify against the crypto metadata.
    #[error("secret does not match crypto metadata")]
    InvalidKey,
    /// Ciphertext could not be decrypted under the current metadata.
    #[error("decryption failed: {reason}")]
    Decrypt { reason: String },
    /// Mapping lookup or removal of an absent key.
    #[error("key not present in mapping: {key}")]
    KeyMissing { key: String },
    /// `pop_item` on an empty mapping.
    #[error("mapping is empty")]
    EmptyMapping,
    /// Secret or rotation operation on a store without encryption.
    #[error("store is not encrypted")]
    NotEncrypted,
    /// Any other crypto provider failure.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
    /// Underlying filesystem failure.
    #[error("io failure on {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey => StoreError::InvalidKey,
            CryptoError::Decrypt(reason) => StoreError::Decrypt { reason },
            other => StoreError::Crypto {
                reason: other.to_string(),
            },
        }
    }
}
