use std::path::{Path, PathBuf};

/// Application directory name under the platform data directory
pub const APP_DIR: &str = "sigil";

/// On-disk locations of the identity material.
///
/// ```text
/// <data-dir>/
/// └── storage/
///     ├── identity/
///     │   └── identity_key   (64 bytes plain, or 128 bytes sealed)
///     └── salt               (present only for a sealed bundle)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    data_dir: PathBuf,
    storage: PathBuf,
}

impl StoragePaths {
    /// Resolve storage paths under the given application data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let storage = data_dir.join("storage");
        Self { data_dir, storage }
    }

    /// Application data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data-dir>/storage`
    pub fn storage_dir(&self) -> &Path {
        &self.storage
    }

    /// `<data-dir>/storage/identity`
    pub fn identity_dir(&self) -> PathBuf {
        self.storage.join("identity")
    }

    /// `<data-dir>/storage/identity/identity_key`
    pub fn identity_key(&self) -> PathBuf {
        self.identity_dir().join("identity_key")
    }

    /// `<data-dir>/storage/salt`
    pub fn salt(&self) -> PathBuf {
        self.storage.join("salt")
    }
}

/// Get the default application data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
