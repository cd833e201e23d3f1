//! Identity Store
//!
//! Owns the on-disk identity key bundle and drives the password unlock flow.
//!
//! ## State Machine
//!
//! ```text
//! Unloaded ──load_identity──► Ready                      (64-byte plain bundle)
//!     │
//!     └─────load_identity──► AwaitingPassword ◄──┐       (128-byte sealed bundle)
//!                                 │              │
//!                          supply_password       │ DecryptionFailure
//!                                 │              │ (wrong password, retryable)
//!                                 ├──────────────┘
//!                                 ▼
//!                               Ready
//! ```
//!
//! `Ready` is terminal for the lifetime of the store. Missing or corrupt
//! identity material is reported as a fatal `StoreError`; a wrong password is
//! not an error at all but a `StoreEvent::DecryptionFailure`.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::paths::StoragePaths;
use super::prompt::PasswordPrompt;
use crate::crypto::sealed::IV_LEN;
use crate::crypto::{self, KdfError, KeyMaterial, SealError};

/// Length of an unencrypted identity bundle
pub const PLAIN_BUNDLE_LEN: usize = 64;

/// Length of a sealed identity bundle (IV + 80-byte body + tag)
pub const SEALED_BUNDLE_LEN: usize = 128;

/// Length of the public identity key at the start of a plain bundle
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of the salt written when sealing an identity
pub const SALT_LEN: usize = 8;

/// Errors raised by the identity store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No identity found at {}: generating identities is not supported", .0.display())]
    MissingIdentity(PathBuf),

    #[error("Identity bundle has unexpected length {0} (expected 64 or 128)")]
    CorruptIdentity(usize),

    #[error("Sealed identity requires a salt file at {}", .0.display())]
    MissingSalt(PathBuf),

    #[error(transparent)]
    KeyDerivation(#[from] KdfError),

    #[error("Identity bundle authenticated but did not decrypt: {0}")]
    CorruptSealedBody(SealError),

    #[error("Decrypted identity has unexpected length {0}")]
    CorruptPlaintext(usize),

    #[error("Identity is already sealed")]
    AlreadySealed,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Operation not valid while store is {0:?}")]
    InvalidState(StoreState),
}

impl StoreError {
    /// Whether this error means the installation is unusable.
    ///
    /// Fatal errors must not be retried. `InvalidState` and `AlreadySealed`
    /// are caller mistakes and leave the store untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidState(_) | Self::AlreadySealed)
    }
}

/// Unlock progress of an `IdentityStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Unloaded,
    AwaitingPassword,
    Ready,
}

/// Events emitted to the host after an unlock step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Identity bundle is decrypted and usable
    Ready,
    /// Wrong password; the host should prompt again
    DecryptionFailure,
}

/// Identity key bundle in one of its two on-disk states.
///
/// Length alone discriminates the states; there is no header.
pub enum IdentityBundle {
    Plain(Zeroizing<Vec<u8>>),
    Sealed(Vec<u8>),
}

impl IdentityBundle {
    /// Classify raw bundle bytes by length
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, StoreError> {
        match bytes.len() {
            PLAIN_BUNDLE_LEN => Ok(Self::Plain(Zeroizing::new(bytes))),
            SEALED_BUNDLE_LEN => Ok(Self::Sealed(bytes)),
            len => Err(StoreError::CorruptIdentity(len)),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Plain(bytes) => bytes.len(),
            Self::Sealed(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for IdentityBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(bytes) => write!(f, "IdentityBundle::Plain({} bytes)", bytes.len()),
            Self::Sealed(bytes) => write!(f, "IdentityBundle::Sealed({} bytes)", bytes.len()),
        }
    }
}

/// Borrowed view of a decrypted identity: public key followed by private key
#[derive(Clone, Copy)]
pub struct IdentityKeyPair<'a> {
    bytes: &'a [u8],
}

impl<'a> IdentityKeyPair<'a> {
    /// View over a plain bundle; `None` unless exactly 64 bytes
    pub fn from_plain(bytes: &'a [u8]) -> Option<Self> {
        (bytes.len() == PLAIN_BUNDLE_LEN).then_some(Self { bytes })
    }

    /// Public identity key (first 32 bytes)
    pub fn public_key(&self) -> &'a [u8] {
        &self.bytes[..PUBLIC_KEY_LEN]
    }

    /// Private identity key (last 32 bytes)
    pub fn private_key(&self) -> &'a [u8] {
        &self.bytes[PUBLIC_KEY_LEN..]
    }

    /// Full plain bundle, as handed to the protocol engine
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Hex SHA-256 of the public key, safe to display
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.public_key()))
    }
}

impl fmt::Debug for IdentityKeyPair<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Locally persisted identity with password unlock.
///
/// Password submissions must be serialised by the host: at most one
/// `supply_password` call in flight per store.
#[derive(Debug)]
pub struct IdentityStore {
    paths: StoragePaths,
    state: StoreState,
    bundle: Option<IdentityBundle>,
    salt: Option<Vec<u8>>,
}

impl IdentityStore {
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            state: StoreState::Unloaded,
            bundle: None,
            salt: None,
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Load the identity bundle and, if it is sealed, ask for a password.
    ///
    /// - 64 bytes: the store becomes `Ready` immediately
    /// - 128 bytes: the store becomes `AwaitingPassword` and
    ///   `prompt.prompt_password()` is called once
    /// - anything else: `StoreError::CorruptIdentity`
    ///
    /// For a sealed bundle the salt file is loaded when present. Its absence
    /// is only an error once a password is supplied. A plain bundle never
    /// touches the salt.
    pub fn load_identity(&mut self, prompt: &dyn PasswordPrompt) -> Result<StoreState, StoreError> {
        if self.state != StoreState::Unloaded {
            return Err(StoreError::InvalidState(self.state));
        }

        let identity_path = self.paths.identity_key();
        let bytes = match read_optional(&identity_path)? {
            Some(bytes) => bytes,
            None => {
                warn!("Generating identities not yet supported");
                info!(path = %identity_path.display(), "Looked for identity");
                return Err(StoreError::MissingIdentity(identity_path));
            }
        };

        let bundle = IdentityBundle::from_bytes(bytes).inspect_err(|_| {
            warn!("Identity key of strange length");
        })?;

        let sealed = bundle.is_sealed();
        if sealed {
            self.salt = read_optional(&self.paths.salt())?;
            if self.salt.is_some() {
                debug!("Read salt file");
            }
        }
        self.bundle = Some(bundle);

        if sealed {
            self.state = StoreState::AwaitingPassword;
            info!("Asking for password");
            prompt.prompt_password();
        } else {
            self.state = StoreState::Ready;
            info!("Unencrypted identity");
        }

        Ok(self.state)
    }

    /// Try to unlock the sealed bundle with a password.
    ///
    /// Derives fresh key material, verifies the bundle tag and decrypts it.
    /// A wrong password yields `Ok(StoreEvent::DecryptionFailure)` and leaves
    /// the store awaiting another attempt; this can be retried indefinitely.
    ///
    /// Blocks for the duration of the key derivation.
    pub fn supply_password(&mut self, password: &str) -> Result<StoreEvent, StoreError> {
        if self.state != StoreState::AwaitingPassword {
            return Err(StoreError::InvalidState(self.state));
        }

        let sealed = match &self.bundle {
            Some(IdentityBundle::Sealed(bytes)) => bytes,
            _ => return Err(StoreError::InvalidState(self.state)),
        };
        let salt = match self.salt.as_deref() {
            Some(salt) if !salt.is_empty() => salt,
            _ => return Err(StoreError::MissingSalt(self.paths.salt())),
        };

        debug!("Store received password");
        let material = KeyMaterial::derive(password, salt)?;

        match crypto::open(&material, sealed) {
            Ok(plain) if plain.len() == PLAIN_BUNDLE_LEN => {
                self.bundle = Some(IdentityBundle::Plain(plain));
                self.state = StoreState::Ready;
                info!("Decrypted identity");
                Ok(StoreEvent::Ready)
            }
            Ok(plain) => Err(StoreError::CorruptPlaintext(plain.len())),
            Err(SealError::Authentication) => {
                warn!("Failure decrypting identity");
                Ok(StoreEvent::DecryptionFailure)
            }
            Err(other) => Err(StoreError::CorruptSealedBody(other)),
        }
    }

    /// Decrypted identity, once the store is `Ready`
    pub fn identity(&self) -> Option<IdentityKeyPair<'_>> {
        match (&self.state, &self.bundle) {
            (StoreState::Ready, Some(IdentityBundle::Plain(bytes))) => {
                IdentityKeyPair::from_plain(bytes)
            }
            _ => None,
        }
    }
}

/// Protect an existing plain identity with a password.
///
/// Generates a fresh salt and IV, writes the salt, then atomically replaces
/// the identity bundle with its sealed form. A crash between the two writes
/// leaves a plain bundle next to an unused salt, which still loads.
pub fn seal_identity(paths: &StoragePaths, password: &str) -> Result<(), StoreError> {
    let identity_path = paths.identity_key();
    let bytes = read_optional(&identity_path)?
        .ok_or_else(|| StoreError::MissingIdentity(identity_path.clone()))?;

    let plain = match IdentityBundle::from_bytes(bytes)? {
        IdentityBundle::Plain(plain) => plain,
        IdentityBundle::Sealed(_) => return Err(StoreError::AlreadySealed),
    };

    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let material = KeyMaterial::derive(password, &salt)?;
    let sealed = crypto::seal(&material, &iv, &plain);

    write_atomic(&paths.salt(), &salt)?;
    write_atomic(&identity_path, &sealed)?;

    info!(path = %identity_path.display(), "Sealed identity with password");
    Ok(())
}

/// Inspect the on-disk bundle without unlocking it
pub fn probe_identity(paths: &StoragePaths) -> Result<IdentityBundle, StoreError> {
    let identity_path = paths.identity_key();
    let bytes =
        read_optional(&identity_path)?.ok_or(StoreError::MissingIdentity(identity_path))?;
    IdentityBundle::from_bytes(bytes)
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(&tmp, contents).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))?;

    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}
