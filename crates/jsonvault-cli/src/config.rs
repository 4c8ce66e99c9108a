use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use jsonvault_core::encoding::TextEncoding;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/jsonvault/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data file location.
    pub data_file: Option<PathBuf>,
    /// Text encoding for stored documents (defaults to utf-8).
    pub text_encoding: Option<TextEncoding>,
    /// Present when the store is encrypted at rest.
    pub encryption: Option<EncryptionConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EncryptionConfig {
    /// Crypto metadata file; defaults to the data file with a `.cryptodata` extension.
    pub metadata_file: Option<PathBuf>,
    /// Read the secret from this environment variable (default `JSONVAULT_SECRET`).
    pub secret_env: Option<String>,
    /// Keep the secret in the OS keyring instead of the environment.
    #[serde(default)]
    pub keyring: bool,
    /// PBKDF2 rounds for newly generated metadata.
    pub kdf_iterations: Option<u32>,
    /// Re-save immediately after every encrypted load (default true).
    pub reseal_on_load: Option<bool>,
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("jsonvault").join("config.toml"))
}

/// Write the given config to disk unless a file already exists there, so
/// user edits are never clobbered.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn returns_default_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_file = "/tmp/vault/store.json"
            text_encoding = "UTF-16LE"
            [encryption]
            metadata_file = "/tmp/vault/store.meta"
            secret_env = "VAULT_PASS"
            keyring = false
            kdf_iterations = 200000
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_file: Some(PathBuf::from("/tmp/vault/store.json")),
                text_encoding: Some(TextEncoding::Utf16Le),
                encryption: Some(EncryptionConfig {
                    metadata_file: Some(PathBuf::from("/tmp/vault/store.meta")),
                    secret_env: Some("VAULT_PASS".into()),
                    keyring: false,
                    kdf_iterations: Some(200_000),
                    reseal_on_load: None,
                }),
            }
        );
    }

    #[test]
    fn rejects_unknown_encoding() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "text_encoding = \"ebcdic\"").expect("write");
        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_file: Some(PathBuf::from("/tmp/vault/store.json")),
            text_encoding: None,
            encryption: Some(EncryptionConfig {
                keyring: true,
                ..EncryptionConfig::default()
            }),
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config::default();
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);
        let loaded: Config =
            toml::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(loaded, cfg);
    }
}
