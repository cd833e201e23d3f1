//! `sigil status`: inspect the identity store without unlocking it

use std::error::Error;
use std::path::PathBuf;

use serde::Serialize;

use sigil::store::{probe_identity, IdentityBundle, IdentityKeyPair, StoragePaths, StoreError};

use super::config::SigilConfig;

/// On-disk state of the identity bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Missing,
    Plain,
    Sealed,
    Corrupt,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub data_dir: PathBuf,
    pub identity_key: PathBuf,
    pub identity: IdentityStatus,
    pub salt_present: bool,
    /// Only available for plain bundles
    pub fingerprint: Option<String>,
}

impl StatusReport {
    pub fn collect(config: &SigilConfig) -> Result<Self, StoreError> {
        let paths = StoragePaths::new(&config.storage.data_dir);

        let (identity, fingerprint) = match probe_identity(&paths) {
            Ok(IdentityBundle::Plain(bytes)) => (
                IdentityStatus::Plain,
                IdentityKeyPair::from_plain(&bytes).map(|pair| pair.fingerprint()),
            ),
            Ok(IdentityBundle::Sealed(_)) => (IdentityStatus::Sealed, None),
            Err(StoreError::MissingIdentity(_)) => (IdentityStatus::Missing, None),
            Err(StoreError::CorruptIdentity(_)) => (IdentityStatus::Corrupt, None),
            Err(e) => return Err(e),
        };

        Ok(Self {
            data_dir: paths.data_dir().to_path_buf(),
            identity_key: paths.identity_key(),
            identity,
            salt_present: paths.salt().exists(),
            fingerprint,
        })
    }
}

pub fn execute(config: &SigilConfig, json: bool) -> Result<(), Box<dyn Error>> {
    let report = StatusReport::collect(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📊 Sigil Status");
    println!();
    println!("  Data directory: {}", report.data_dir.display());
    println!("  Identity key:   {}", report.identity_key.display());
    let identity = match report.identity {
        IdentityStatus::Missing => "❌ missing",
        IdentityStatus::Plain => "⚠️  plain (not password protected)",
        IdentityStatus::Sealed => "🔒 sealed",
        IdentityStatus::Corrupt => "❌ corrupt (unexpected length)",
    };
    println!("  Identity:       {}", identity);
    println!(
        "  Salt:           {}",
        if report.salt_present { "present" } else { "absent" }
    );
    if let Some(fingerprint) = &report.fingerprint {
        println!("  Fingerprint:    {}", fingerprint);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> SigilConfig {
        SigilConfig::new(dir.path().to_path_buf())
    }

    #[test]
    fn test_status_missing_identity() {
        let temp_dir = TempDir::new().unwrap();
        let report = StatusReport::collect(&config_for(&temp_dir)).unwrap();

        assert_eq!(report.identity, IdentityStatus::Missing);
        assert!(!report.salt_present);
        assert!(report.fingerprint.is_none());
    }

    #[test]
    fn test_status_plain_identity_has_fingerprint() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp_dir.path());
        fs::create_dir_all(paths.identity_dir()).unwrap();
        fs::write(paths.identity_key(), [7u8; 64]).unwrap();

        let report = StatusReport::collect(&config_for(&temp_dir)).unwrap();
        assert_eq!(report.identity, IdentityStatus::Plain);
        assert_eq!(report.fingerprint.as_deref().map(str::len), Some(64));
    }

    #[test]
    fn test_status_corrupt_identity() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp_dir.path());
        fs::create_dir_all(paths.identity_dir()).unwrap();
        fs::write(paths.identity_key(), [7u8; 10]).unwrap();

        let report = StatusReport::collect(&config_for(&temp_dir)).unwrap();
        assert_eq!(report.identity, IdentityStatus::Corrupt);
    }

    #[test]
    fn test_status_json_shape() {
        let temp_dir = TempDir::new().unwrap();
        let report = StatusReport::collect(&config_for(&temp_dir)).unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["identity"], "missing");
        assert_eq!(value["salt_present"], false);
        assert!(value["fingerprint"].is_null());
    }
}
