use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
    #[error("secret source {0} cannot be updated")]
    ReadOnly(&'static str),
    #[error("secret unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the secret an encrypted store is opened with (OS keychain in
/// production; environment or memory elsewhere).
pub trait SecretSource {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    fn secret(&self) -> Result<Zeroizing<String>, SecretError>;

    /// Whether `replace` can persist a new secret.
    fn can_replace(&self) -> bool {
        true
    }

    /// Persist a replacement secret after a successful rotation.
    fn replace(&self, secret: &str) -> Result<(), SecretError>;
}

/// OS keyring-backed source. Generates and stores a random secret on first
/// use unless restricted to existing entries.
pub struct KeyringSecret {
    service: String,
    account: String,
    create_if_missing: bool,
}

impl KeyringSecret {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            create_if_missing: true,
        }
    }

    /// Whether a missing entry is created (default) or reported as
    /// [`SecretError::Unavailable`].
    pub fn create_if_missing(mut self, enabled: bool) -> Self {
        self.create_if_missing = enabled;
        self
    }

    fn entry(&self) -> Result<keyring::Entry, SecretError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| SecretError::Keyring(e.to_string()))
    }
}

impl SecretSource for KeyringSecret {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn secret(&self) -> Result<Zeroizing<String>, SecretError> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(secret) => Ok(Zeroizing::new(secret)),
            Err(keyring::Error::NoEntry) if !self.create_if_missing => {
                Err(SecretError::Unavailable(format!(
                    "no keyring entry for {}/{}",
                    self.service, self.account
                )))
            }
            Err(keyring::Error::NoEntry) => {
                info!(service = %self.service, "creating keyring secret");
                let secret = generate_secret();
                entry
                    .set_password(&secret)
                    .map_err(|e| SecretError::Keyring(e.to_string()))?;
                Ok(secret)
            }
            Err(err) => Err(SecretError::Keyring(err.to_string())),
        }
    }

    fn replace(&self, secret: &str) -> Result<(), SecretError> {
        self.entry()?
            .set_password(secret)
            .map_err(|e| SecretError::Keyring(e.to_string()))
    }
}

/// Reads the secret from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvSecret {
    var: String,
}

impl EnvSecret {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl SecretSource for EnvSecret {
    fn name(&self) -> &'static str {
        "env"
    }

    fn secret(&self) -> Result<Zeroizing<String>, SecretError> {
        std::env::var(&self.var)
            .map(Zeroizing::new)
            .map_err(|_| SecretError::MissingEnv(self.var.clone()))
    }

    fn can_replace(&self) -> bool {
        false
    }

    fn replace(&self, _secret: &str) -> Result<(), SecretError> {
        Err(SecretError::ReadOnly("env"))
    }
}

/// In-memory source for tests and ephemeral sessions.
#[derive(Default, Clone)]
pub struct StaticSecret {
    inner: Arc<Mutex<Option<Zeroizing<String>>>>,
}

impl StaticSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Zeroizing::new(secret.into())))),
        }
    }
}

impl SecretSource for StaticSecret {
    fn name(&self) -> &'static str {
        "static"
    }

    fn secret(&self) -> Result<Zeroizing<String>, SecretError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| SecretError::Unavailable(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let secret = generate_secret();
        *guard = Some(secret.clone());
        Ok(secret)
    }

    fn replace(&self, secret: &str) -> Result<(), SecretError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| SecretError::Unavailable(format!("lock poisoned: {err}")))?;
        *guard = Some(Zeroizing::new(secret.to_string()));
        Ok(())
    }
}

/// Random 256-bit secret, base64 encoded.
pub fn generate_secret() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut bytes[..]);
    Zeroizing::new(general_purpose::STANDARD.encode(&bytes[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_source_returns_same_secret() {
        let source = StaticSecret::default();
        let first = source.secret().unwrap();
        let second = source.secret().unwrap();

        assert_eq!(*first, *second);
        assert_eq!(first.len(), 44);
    }

    #[test]
    fn static_source_accepts_replacement() {
        let source = StaticSecret::new("old");
        source.replace("new").expect("replace");
        assert_eq!(source.secret().expect("secret").as_str(), "new");
    }

    #[test]
    fn env_source_reports_missing_variable() {
        let source = EnvSecret::new("JSONVAULT_TEST_SECRET_THAT_IS_NEVER_SET");
        let err = source.secret().expect_err("should be missing");
        assert!(matches!(err, SecretError::MissingEnv(_)));
        assert!(!source.can_replace());
        assert_eq!(source.replace("x"), Err(SecretError::ReadOnly("env")));
    }

    #[test]
    fn keyring_source_only_creates_when_allowed() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());

        let existing_only =
            KeyringSecret::new("jsonvault-test", "store-secret").create_if_missing(false);
        let err = existing_only.secret().expect_err("entry is missing");
        assert!(matches!(err, SecretError::Unavailable(_)), "{err:?}");

        let creating = KeyringSecret::new("jsonvault-test", "store-secret");
        assert_eq!(creating.secret().expect("created").len(), 44);
    }

    #[test]
    fn generated_secrets_differ() {
        assert_ne!(*generate_secret(), *generate_secret());
    }
}
