use std::{
    fmt,
    io::{Read, Write},
};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use jsonvault_core::{
    crypto::{CryptoError, CryptoProvider, KeyCheck},
    encoding::TextEncoding,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// PBKDF2 rounds used for newly generated metadata.
pub const DEFAULT_ITERATIONS: u32 = 100_000;
/// Upper bound accepted from config and from metadata files.
pub const MAX_ITERATIONS: u32 = 10 * DEFAULT_ITERATIONS;

const METADATA_VERSION: u32 = 1;
const KDF_NAME: &str = "pbkdf2-hmac-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_CHECK_LABEL: &[u8] = b"jsonvault/key-check/v1";
const NONCE_LABEL: &[u8] = b"jsonvault/nonce/v1";

/// Password-based provider: PBKDF2-HMAC-SHA256 key derivation, an HMAC key
/// check for verification, and AES-256-GCM with a synthetic nonce.
///
/// The nonce is derived from the plaintext under the MAC key, so sealing the
/// same document twice with the same metadata yields identical bytes.
#[derive(Debug, Clone, Copy)]
pub struct HashCryptoProvider {
    iterations: u32,
}

impl HashCryptoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider generating metadata with a custom PBKDF2 round count.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.clamp(1, MAX_ITERATIONS),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for HashCryptoProvider {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Crypto metadata bound to a secret. Holds derived keys in memory only.
#[derive(Clone)]
pub struct HashMetadata {
    iterations: u32,
    salt: Vec<u8>,
    key_check: Vec<u8>,
    keys: DerivedKeys,
}

impl HashMetadata {
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl fmt::Debug for HashMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMetadata")
            .field("iterations", &self.iterations)
            .field("salt", &STANDARD.encode(&self.salt))
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct DerivedKeys {
    cipher: Zeroizing<[u8; KEY_LEN]>,
    mac: Zeroizing<[u8; KEY_LEN]>,
}

/// On-disk form of [`HashMetadata`].
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    version: u32,
    kdf: String,
    iterations: u32,
    salt: String,
    key_check: String,
}

impl CryptoProvider for HashCryptoProvider {
    type Metadata = HashMetadata;

    fn make_metadata(
        &self,
        secret: &str,
        encoding: TextEncoding,
    ) -> Result<HashMetadata, CryptoError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let keys = derive_keys(secret, encoding, &salt, self.iterations)?;
        let key_check = key_check_mac(&keys)?.finalize().into_bytes().to_vec();
        Ok(HashMetadata {
            iterations: self.iterations,
            salt,
            key_check,
            keys,
        })
    }

    fn verify(
        &self,
        metadata: &HashMetadata,
        secret: &str,
        encoding: TextEncoding,
    ) -> Result<KeyCheck, CryptoError> {
        let candidate = derive_keys(secret, encoding, &metadata.salt, metadata.iterations)?;
        match key_check_mac(&candidate)?.verify_slice(&metadata.key_check) {
            Ok(()) => Ok(KeyCheck::Match),
            Err(_) => Ok(KeyCheck::Mismatch),
        }
    }

    fn encrypt(&self, metadata: &HashMetadata, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = build_cipher(&metadata.keys)?;
        let nonce = synthetic_nonce(&metadata.keys, plaintext)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, metadata: &HashMetadata, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Decrypt(format!(
                "ciphertext too short: {} bytes",
                ciphertext.len()
            )));
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        build_cipher(&metadata.keys)?
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CryptoError::Decrypt("authentication failed".to_string()))
    }

    fn load_metadata(
        &self,
        reader: &mut dyn Read,
        secret: &str,
        encoding: TextEncoding,
    ) -> Result<HashMetadata, CryptoError> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| CryptoError::Io(e.to_string()))?;
        let file: MetadataFile =
            serde_json::from_slice(&buf).map_err(|e| CryptoError::Malformed(e.to_string()))?;

        if file.version != METADATA_VERSION {
            return Err(CryptoError::Malformed(format!(
                "unsupported version {}",
                file.version
            )));
        }
        if file.kdf != KDF_NAME {
            return Err(CryptoError::Malformed(format!("unsupported kdf {}", file.kdf)));
        }
        if file.iterations == 0 {
            return Err(CryptoError::Malformed("iterations must be positive".into()));
        }
        if file.iterations > MAX_ITERATIONS {
            return Err(CryptoError::Malformed(format!(
                "iterations {} exceed the limit of {MAX_ITERATIONS}",
                file.iterations
            )));
        }
        let salt = decode_field("salt", &file.salt, SALT_LEN)?;
        let key_check = decode_field("key_check", &file.key_check, KEY_LEN)?;

        // No verification here: a wrong secret shows up when decrypting.
        let keys = derive_keys(secret, encoding, &salt, file.iterations)?;
        Ok(HashMetadata {
            iterations: file.iterations,
            salt,
            key_check,
            keys,
        })
    }

    fn dump_metadata(
        &self,
        metadata: &HashMetadata,
        writer: &mut dyn Write,
    ) -> Result<(), CryptoError> {
        let file = MetadataFile {
            version: METADATA_VERSION,
            kdf: KDF_NAME.to_string(),
            iterations: metadata.iterations,
            salt: STANDARD.encode(&metadata.salt),
            key_check: STANDARD.encode(&metadata.key_check),
        };
        let json =
            serde_json::to_vec_pretty(&file).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        writer
            .write_all(&json)
            .and_then(|_| writer.flush())
            .map_err(|e| CryptoError::Io(e.to_string()))
    }
}

fn derive_keys(
    secret: &str,
    encoding: TextEncoding,
    salt: &[u8],
    iterations: u32,
) -> Result<DerivedKeys, CryptoError> {
    let password = Zeroizing::new(encoding.encode(secret));
    let mut output = Zeroizing::new([0u8; 2 * KEY_LEN]);
    pbkdf2::pbkdf2::<HmacSha256>(&password, salt, iterations, &mut output[..])
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;

    let mut cipher = Zeroizing::new([0u8; KEY_LEN]);
    let mut mac = Zeroizing::new([0u8; KEY_LEN]);
    cipher.copy_from_slice(&output[..KEY_LEN]);
    mac.copy_from_slice(&output[KEY_LEN..]);
    Ok(DerivedKeys { cipher, mac })
}

fn key_check_mac(keys: &DerivedKeys) -> Result<HmacSha256, CryptoError> {
    let mut mac = new_mac(keys)?;
    mac.update(KEY_CHECK_LABEL);
    Ok(mac)
}

fn synthetic_nonce(keys: &DerivedKeys, plaintext: &[u8]) -> Result<[u8; NONCE_LEN], CryptoError> {
    let mut mac = new_mac(keys)?;
    mac.update(NONCE_LABEL);
    mac.update(plaintext);
    let digest = mac.finalize().into_bytes();
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&digest[..NONCE_LEN]);
    Ok(nonce)
}

fn new_mac(keys: &DerivedKeys) -> Result<HmacSha256, CryptoError> {
    <HmacSha256 as Mac>::new_from_slice(&keys.mac[..]).map_err(|e| CryptoError::Kdf(e.to_string()))
}

fn build_cipher(keys: &DerivedKeys) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(&keys.cipher[..])
        .map_err(|e| CryptoError::Encrypt(format!("cipher init failed: {e}")))
}

fn decode_field(name: &str, value: &str, expected: usize) -> Result<Vec<u8>, CryptoError> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Malformed(format!("{name}: {e}")))?;
    if bytes.len() != expected {
        return Err(CryptoError::Malformed(format!(
            "{name}: expected {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
