use std::path::{Path, PathBuf};

use color_eyre::Result;
use dirs::data_dir;
use jsonvault_storage::{
    hash_provider::{HashCryptoProvider, DEFAULT_ITERATIONS},
    secret_source::{EnvSecret, KeyringSecret, SecretSource},
    JsonStore, StoreOptions,
};
use tracing::debug;

use crate::config::{Config, EncryptionConfig};

pub const SECRET_ENV: &str = "JSONVAULT_SECRET";
const KEYRING_SERVICE: &str = "jsonvault";
const KEYRING_ACCOUNT: &str = "store-secret";

/// A configured store plus the source its secret came from (encrypted only).
pub struct OpenStore {
    pub store: JsonStore,
    pub secrets: Option<Box<dyn SecretSource>>,
}

/// Resolve the default data file for jsonvault.
pub fn default_data_file() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("jsonvault").join("store.json"))
}

/// Crypto metadata lives next to the data file unless configured otherwise.
pub fn metadata_file_for(data_file: &Path) -> PathBuf {
    data_file.with_extension("cryptodata")
}

/// Pick the secret source described by the encryption config. A keyring
/// secret is only generated for a store that does not exist yet.
pub fn secret_source(cfg: &EncryptionConfig, store_exists: bool) -> Box<dyn SecretSource> {
    if cfg.keyring {
        let keyring =
            KeyringSecret::new(KEYRING_SERVICE, KEYRING_ACCOUNT).create_if_missing(!store_exists);
        return Box::new(keyring);
    }
    let var = cfg.secret_env.as_deref().unwrap_or(SECRET_ENV);
    Box::new(EnvSecret::new(var))
}

/// Build a store using config overrides; `file` wins over the config file.
pub fn store_from_config(config: &Config, file: Option<&Path>) -> Result<OpenStore> {
    let data_file = match (file, &config.data_file) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(path)) => path.clone(),
        (None, None) => default_data_file()?,
    };
    let options = StoreOptions::new(&data_file)
        .with_encoding(config.text_encoding.unwrap_or_default());

    let Some(enc) = &config.encryption else {
        debug!(?data_file, "initializing plain store");
        return Ok(OpenStore {
            store: JsonStore::plain(options),
            secrets: None,
        });
    };

    let source = secret_source(enc, data_file.exists());
    open_encrypted(&data_file, options, enc, source)
}

fn open_encrypted(
    data_file: &Path,
    options: StoreOptions,
    enc: &EncryptionConfig,
    source: Box<dyn SecretSource>,
) -> Result<OpenStore> {
    let metadata_file = enc
        .metadata_file
        .clone()
        .unwrap_or_else(|| metadata_file_for(data_file));
    let provider =
        HashCryptoProvider::with_iterations(enc.kdf_iterations.unwrap_or(DEFAULT_ITERATIONS));
    let options = options.reseal_on_load(enc.reseal_on_load.unwrap_or(true));
    let secret = source.secret()?;
    debug!(?data_file, ?metadata_file, source = source.name(), "initializing encrypted store");

    Ok(OpenStore {
        store: JsonStore::encrypted(options, metadata_file, secret.as_str(), provider),
        secrets: Some(source),
    })
}

/// Helper for tests: an encrypted store in `root` with an in-memory secret.
#[cfg(test)]
pub fn test_store(root: &Path, secret: &str) -> OpenStore {
    use jsonvault_storage::secret_source::StaticSecret;

    test_store_with_source(root, Box::new(StaticSecret::new(secret)))
}

#[cfg(test)]
pub fn test_store_with_source(root: &Path, source: Box<dyn SecretSource>) -> OpenStore {
    let enc = EncryptionConfig {
        kdf_iterations: Some(1_000),
        ..EncryptionConfig::default()
    };
    let data_file = root.join("store.json");
    open_encrypted(
        &data_file,
        StoreOptions::new(&data_file),
        &enc,
        source,
    )
    .expect("test secret is always available")
}
