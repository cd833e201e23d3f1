//! `sigil seal`: protect a plain identity with a password

use std::error::Error;

use sigil::store::{seal_identity, StoragePaths};

use super::config::SigilConfig;
use super::password::{determine_password_source, read_new_password};

pub fn execute(config: &SigilConfig, password_file: Option<String>) -> Result<(), Box<dyn Error>> {
    let paths = StoragePaths::new(&config.storage.data_dir);
    let source = determine_password_source(password_file);
    let password = read_new_password(&source).map_err(|e| e as Box<dyn Error>)?;

    seal_identity(&paths, &password)?;

    println!("🔒 Identity sealed");
    println!("   Bundle: {}", paths.identity_key().display());
    println!("   Salt:   {}", paths.salt().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil::store::{probe_identity, IdentityBundle};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (SigilConfig, String) {
        let config = SigilConfig::new(dir.path().to_path_buf());
        let paths = StoragePaths::new(dir.path());
        fs::create_dir_all(paths.identity_dir()).unwrap();
        fs::write(paths.identity_key(), [0x55; 64]).unwrap();

        let password_path: PathBuf = dir.path().join("password.txt");
        fs::write(&password_path, "s3cret\n").unwrap();
        (config, password_path.to_string_lossy().to_string())
    }

    #[test]
    fn test_seal_plain_identity() {
        let temp_dir = TempDir::new().unwrap();
        let (config, password_file) = setup(&temp_dir);

        execute(&config, Some(password_file)).unwrap();

        let paths = StoragePaths::new(temp_dir.path());
        assert!(probe_identity(&paths).unwrap().is_sealed());
        assert_eq!(fs::read(paths.salt()).unwrap().len(), 8);
    }

    #[test]
    fn test_seal_twice_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let (config, password_file) = setup(&temp_dir);

        execute(&config, Some(password_file.clone())).unwrap();
        let err = execute(&config, Some(password_file)).unwrap_err();

        assert!(err.to_string().contains("already sealed"));
        let paths = StoragePaths::new(temp_dir.path());
        assert!(matches!(
            probe_identity(&paths).unwrap(),
            IdentityBundle::Sealed(_)
        ));
    }
}
