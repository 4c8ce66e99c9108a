use std::{
    fmt,
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use jsonvault_core::{
    crypto::{CryptoError, CryptoProvider, KeyCheck},
    encoding::TextEncoding,
    storage::{Mapping, Object, StoreError},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::hash_provider::HashCryptoProvider;

/// Construction-time options shared by plain and encrypted stores.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    data_path: PathBuf,
    default: Object,
    encoding: TextEncoding,
    reseal_on_load: bool,
}

impl StoreOptions {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            default: Object::new(),
            encoding: TextEncoding::default(),
            reseal_on_load: true,
        }
    }

    /// Contents used when the data file is created.
    pub fn with_default(mut self, default: Object) -> Self {
        self.default = default;
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Whether an encrypted load immediately saves again (default `true`).
    /// The re-save rewrites the metadata file under the in-memory secret.
    pub fn reseal_on_load(mut self, enabled: bool) -> Self {
        self.reseal_on_load = enabled;
        self
    }
}

/// Result of checking the current secret against the loaded crypto metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Unchanged,
    Rotated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    /// First write of a new store; the data file must not appear underneath us.
    Create,
    Update,
}

struct Encryption<P: CryptoProvider> {
    metadata_path: PathBuf,
    secret: Zeroizing<String>,
    provider: P,
    metadata: Option<P::Metadata>,
}

/// In-memory state replaced by a load, kept until the load has committed.
struct Snapshot<P: CryptoProvider> {
    data: Option<Object>,
    metadata: Option<P::Metadata>,
}

/// Serialized artifacts of one encrypted save.
struct Sealed {
    ciphertext: Vec<u8>,
    metadata: Vec<u8>,
}

/// Single-file JSON object store with optional encryption at rest.
///
/// The object lives in memory between `load` and `save`; mapping operations
/// (see [`Mapping`]) never touch the disk. Encrypted stores keep a separate
/// crypto metadata file and re-key transparently when the secret is changed
/// between a load and a save.
pub struct JsonStore<P: CryptoProvider = HashCryptoProvider> {
    data_path: PathBuf,
    default: Object,
    encoding: TextEncoding,
    reseal_on_load: bool,
    encryption: Option<Encryption<P>>,
    data: Option<Object>,
}

impl JsonStore<HashCryptoProvider> {
    /// Store that reads and writes plain JSON text.
    pub fn plain(options: StoreOptions) -> Self {
        Self::from_parts(options, None)
    }
}

impl<P: CryptoProvider> JsonStore<P> {
    /// Store that writes ciphertext to the data file and crypto metadata to
    /// `metadata_path`.
    pub fn encrypted(
        options: StoreOptions,
        metadata_path: impl Into<PathBuf>,
        secret: impl Into<String>,
        provider: P,
    ) -> Self {
        let encryption = Encryption {
            metadata_path: metadata_path.into(),
            secret: Zeroizing::new(secret.into()),
            provider,
            metadata: None,
        };
        Self::from_parts(options, Some(encryption))
    }

    fn from_parts(options: StoreOptions, encryption: Option<Encryption<P>>) -> Self {
        Self {
            data_path: options.data_path,
            default: options.default,
            encoding: options.encoding,
            reseal_on_load: options.reseal_on_load,
            encryption,
            data: None,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn metadata_path(&self) -> Option<&Path> {
        self.encryption.as_ref().map(|enc| enc.metadata_path.as_path())
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Replace the secret. Takes effect at the next `save`, which detects the
    /// change and re-keys.
    pub fn set_secret(&mut self, secret: impl Into<String>) -> Result<(), StoreError> {
        let enc = self.encryption.as_mut().ok_or(StoreError::NotEncrypted)?;
        enc.secret = Zeroizing::new(secret.into());
        Ok(())
    }

    /// Check whether the current secret still matches the loaded metadata.
    pub fn key_state(&self) -> Result<KeyState, StoreError> {
        let enc = self.encryption.as_ref().ok_or(StoreError::NotEncrypted)?;
        if self.data.is_none() {
            return Err(StoreError::NotLoaded);
        }
        enc.key_state(self.encoding)
    }

    /// Read the data file into memory.
    ///
    /// A missing file is created from the default when `create_if_missing`
    /// is set and reported as [`StoreError::NotFound`] otherwise.
    #[instrument(skip_all, fields(path = %self.data_path.display(), encrypted = self.encryption.is_some()))]
    pub fn load(&mut self, create_if_missing: bool) -> Result<(), StoreError> {
        let meta = match fs::metadata(&self.data_path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if !create_if_missing {
                    return Err(StoreError::NotFound {
                        path: self.data_path.clone(),
                    });
                }
                info!("data file missing, creating from default");
                let previous = self.swap_state(Some(self.default.clone()), None);
                return self.save_or_restore(SaveMode::Create, previous);
            }
            Err(err) => return Err(StoreError::io(&self.data_path, err)),
        };
        if !meta.is_file() {
            return Err(StoreError::InvalidTarget {
                path: self.data_path.clone(),
            });
        }

        let encoding = self.encoding;
        let (object, metadata) = match self.encryption.as_ref() {
            None => {
                let bytes = read_file(&self.data_path)?;
                (parse_object(&self.data_path, &bytes, encoding)?, None)
            }
            Some(enc) => {
                let metadata = enc.read_metadata(encoding)?;
                let ciphertext = read_file(&self.data_path)?;
                let plaintext = Zeroizing::new(enc.provider.decrypt(&metadata, &ciphertext)?);
                let object = parse_object(&self.data_path, &plaintext, encoding)?;
                (object, Some(metadata))
            }
        };
        let previous = self.swap_state(Some(object), metadata);
        debug!("loaded data file");

        if self.encryption.is_some() && self.reseal_on_load {
            return self.save_or_restore(SaveMode::Update, previous);
        }
        Ok(())
    }

    /// Write the in-memory object back to disk.
    ///
    /// Encrypted stores re-key first if the secret changed since the metadata
    /// was made, then write the data file before the metadata file. An
    /// interruption between the two leaves new ciphertext next to the old
    /// metadata, which the next load reports as a decrypt failure.
    #[instrument(skip_all, fields(path = %self.data_path.display(), encrypted = self.encryption.is_some()))]
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.save_as(SaveMode::Update)
    }

    /// Install loaded state and hand back what it replaced.
    fn swap_state(&mut self, data: Option<Object>, metadata: Option<P::Metadata>) -> Snapshot<P> {
        let previous_data = std::mem::replace(&mut self.data, data);
        let previous_metadata = match self.encryption.as_mut() {
            Some(enc) => std::mem::replace(&mut enc.metadata, metadata),
            None => None,
        };
        Snapshot {
            data: previous_data,
            metadata: previous_metadata,
        }
    }

    /// Save freshly installed state; a failed write puts `previous` back.
    fn save_or_restore(&mut self, mode: SaveMode, previous: Snapshot<P>) -> Result<(), StoreError> {
        if let Err(err) = self.save_as(mode) {
            self.swap_state(previous.data, previous.metadata);
            return Err(err);
        }
        Ok(())
    }

    fn save_as(&mut self, mode: SaveMode) -> Result<(), StoreError> {
        let data = self.data.as_ref().ok_or(StoreError::NotLoaded)?;
        let text = serde_json::to_string(data).map_err(|e| StoreError::corrupt(&self.data_path, e))?;
        let plaintext = Zeroizing::new(self.encoding.encode(&text));

        match self.encryption.as_mut() {
            None => write_file(&self.data_path, &plaintext, mode),
            Some(enc) => {
                let sealed = enc.seal(mode, self.encoding, &plaintext)?;
                write_file(&self.data_path, &sealed.ciphertext, mode)?;
                write_file(&enc.metadata_path, &sealed.metadata, SaveMode::Update)
            }
        }
    }
}

impl<P: CryptoProvider> Encryption<P> {
    fn key_state(&self, encoding: TextEncoding) -> Result<KeyState, StoreError> {
        let Some(metadata) = &self.metadata else {
            return Ok(KeyState::Rotated);
        };
        match self.provider.verify(metadata, &self.secret, encoding) {
            Ok(KeyCheck::Match) => Ok(KeyState::Unchanged),
            Ok(KeyCheck::Mismatch) | Err(CryptoError::InvalidKey) => Ok(KeyState::Rotated),
            Err(err) => Err(err.into()),
        }
    }

    /// Metadata must be current before anything is encrypted with it.
    fn seal(
        &mut self,
        mode: SaveMode,
        encoding: TextEncoding,
        plaintext: &[u8],
    ) -> Result<Sealed, StoreError> {
        let regenerate = match mode {
            SaveMode::Create => true,
            SaveMode::Update => {
                let rotated = self.key_state(encoding)? == KeyState::Rotated;
                if rotated {
                    info!("secret changed, regenerating crypto metadata");
                }
                rotated
            }
        };
        if regenerate {
            self.metadata = Some(self.provider.make_metadata(&self.secret, encoding)?);
        }
        let Some(metadata) = self.metadata.as_ref() else {
            return Err(StoreError::Crypto {
                reason: "crypto metadata unavailable".to_string(),
            });
        };

        let ciphertext = self.provider.encrypt(metadata, plaintext)?;
        let mut dumped = Vec::new();
        self.provider
            .dump_metadata(metadata, &mut dumped)
            .map_err(|err| self.metadata_err(err))?;
        Ok(Sealed {
            ciphertext,
            metadata: dumped,
        })
    }

    fn read_metadata(&self, encoding: TextEncoding) -> Result<P::Metadata, StoreError> {
        let mut file =
            File::open(&self.metadata_path).map_err(|e| StoreError::io(&self.metadata_path, e))?;
        self.provider
            .load_metadata(&mut file, &self.secret, encoding)
            .map_err(|err| self.metadata_err(err))
    }

    fn metadata_err(&self, err: CryptoError) -> StoreError {
        match err {
            CryptoError::Malformed(reason) => StoreError::corrupt(&self.metadata_path, reason),
            CryptoError::Io(reason) => StoreError::Io {
                path: self.metadata_path.clone(),
                reason,
            },
            other => other.into(),
        }
    }
}

impl<P: CryptoProvider> Mapping for JsonStore<P> {
    fn mapping(&self) -> Result<&Object, StoreError> {
        self.data.as_ref().ok_or(StoreError::NotLoaded)
    }

    fn mapping_mut(&mut self) -> Result<&mut Object, StoreError> {
        self.data.as_mut().ok_or(StoreError::NotLoaded)
    }
}

impl<P: CryptoProvider> fmt::Debug for JsonStore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonStore")
            .field("data_path", &self.data_path)
            .field("metadata_path", &self.metadata_path())
            .field("encoding", &self.encoding)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

fn parse_object(path: &Path, bytes: &[u8], encoding: TextEncoding) -> Result<Object, StoreError> {
    let text = Zeroizing::new(
        encoding
            .decode(bytes)
            .map_err(|e| StoreError::corrupt(path, e))?,
    );
    serde_json::from_str(&text).map_err(|e| StoreError::corrupt(path, e))
}

fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    let mut file = File::open(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            StoreError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::io(path, err)
        }
    })?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| StoreError::io(path, e))?;
    Ok(buf)
}

/// Replace `path` atomically via a temp file in the same directory.
fn write_file(path: &Path, bytes: &[u8], mode: SaveMode) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(path, e))?;
    tmp.flush().map_err(|e| StoreError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))?;

    let persisted = match mode {
        SaveMode::Create => tmp.persist_noclobber(path),
        SaveMode::Update => tmp.persist(path),
    };
    persisted.map_err(|e| StoreError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
