use std::io::{Read, Write};

use thiserror::Error;

use crate::encoding::TextEncoding;

/// Errors produced by crypto providers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Secret does not verify against the metadata.
    #[error("invalid key")]
    InvalidKey,
    /// Ciphertext is malformed or does not match the metadata.
    #[error("decrypt failed: {0}")]
    Decrypt(String),
    /// Encryption failed.
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    /// Serialized metadata could not be understood.
    #[error("malformed metadata: {0}")]
    Malformed(String),
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    Kdf(String),
    /// Reading or writing the metadata stream failed.
    #[error("metadata io: {0}")]
    Io(String),
}

/// Outcome of checking a secret against existing metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    Match,
    Mismatch,
}

/// Encryption and key-verification capability consumed by encrypted stores.
///
/// Metadata is bound to a secret: it is regenerable from the secret alone, lets
/// a candidate secret be verified, and carries whatever the provider needs to
/// derive the actual cipher key.
pub trait CryptoProvider {
    type Metadata;

    /// Build fresh metadata for `secret`.
    fn make_metadata(
        &self,
        secret: &str,
        encoding: TextEncoding,
    ) -> Result<Self::Metadata, CryptoError>;

    /// Check whether `secret` is the one `metadata` was made from.
    ///
    /// A wrong secret is reported as [`KeyCheck::Mismatch`], never as an error.
    fn verify(
        &self,
        metadata: &Self::Metadata,
        secret: &str,
        encoding: TextEncoding,
    ) -> Result<KeyCheck, CryptoError>;

    fn encrypt(&self, metadata: &Self::Metadata, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, metadata: &Self::Metadata, ciphertext: &[u8])
        -> Result<Vec<u8>, CryptoError>;

    /// Read serialized metadata and bind it to `secret`.
    fn load_metadata(
        &self,
        reader: &mut dyn Read,
        secret: &str,
        encoding: TextEncoding,
    ) -> Result<Self::Metadata, CryptoError>;

    /// Serialize metadata; secret-derived key material is never written.
    fn dump_metadata(
        &self,
        metadata: &Self::Metadata,
        writer: &mut dyn Write,
    ) -> Result<(), CryptoError>;
}
