//! `sigil unlock`: decrypt the identity and hand it to the protocol engine

use std::error::Error;

use tokio::sync::mpsc;
use tracing::{debug, error};

use sigil::engine::{EngineContext, MockEngine};
use sigil::store::{
    prompt_channel, submission_channel, unlock, IdentityStore, PasswordSubmitted, StoragePaths,
    StoreEvent, UnlockError,
};

use super::config::SigilConfig;
use super::password::{determine_password_source, read_password, PasswordSource};

/// Unlock the identity store and register it with an engine context
pub async fn execute(
    config: &SigilConfig,
    password_file: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let paths = StoragePaths::new(&config.storage.data_dir);
    let source = determine_password_source(password_file);

    let store = unlock_store(IdentityStore::new(paths), source).await?;

    let mut context = EngineContext::new(MockEngine::new())?;
    let fingerprint = context.install_identity(&store)?;

    println!("✅ Identity unlocked");
    println!("   Fingerprint: {}", fingerprint);
    Ok(())
}

/// Run the unlock flow, answering password requests from `source`.
///
/// Non-interactive sources get a single attempt.
pub async fn unlock_store(
    store: IdentityStore,
    source: PasswordSource,
) -> Result<IdentityStore, Box<dyn Error>> {
    let (prompt, mut requests) = prompt_channel();
    let (submit, submissions) = submission_channel();
    let (events, mut event_rx) = mpsc::unbounded_channel();

    let host = tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            if request.is_retry() {
                if !source.is_interactive() {
                    break;
                }
                eprintln!("❌ Incorrect password, try again");
            }

            let source = source.clone();
            let password = tokio::task::spawn_blocking(move || {
                read_password(&source, "Identity password: ")
            })
            .await;

            let password = match password {
                Ok(Ok(password)) => password,
                Ok(Err(e)) => {
                    error!("Failed to read password: {}", e);
                    break;
                }
                Err(e) => {
                    error!("Password reader failed: {}", e);
                    break;
                }
            };
            if submit.send(PasswordSubmitted::new(password.as_str())).await.is_err() {
                break;
            }
        }
        debug!("Password host finished");
    });

    let result = unlock(store, &prompt, submissions, &events).await;
    drop(prompt);
    host.await?;

    let mut failures = 0;
    while let Ok(event) = event_rx.try_recv() {
        if event == StoreEvent::DecryptionFailure {
            failures += 1;
        }
    }

    match result {
        Ok(store) => Ok(store),
        Err(UnlockError::PromptClosed) if failures > 0 => {
            Err(format!("Incorrect password ({} attempt(s))", failures).into())
        }
        Err(UnlockError::PromptClosed) => Err("No password supplied".into()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil::crypto::sealed::IV_LEN;
    use sigil::crypto::{seal, KeyMaterial};
    use sigil::store::StoreState;
    use std::fs;
    use tempfile::TempDir;

    fn write_sealed(dir: &TempDir, password: &str) -> StoragePaths {
        let paths = StoragePaths::new(dir.path());
        let salt = *b"12345678";
        let material = KeyMaterial::derive(password, &salt).unwrap();

        fs::create_dir_all(paths.identity_dir()).unwrap();
        fs::write(paths.identity_key(), seal(&material, &[4; IV_LEN], &[0x21; 64])).unwrap();
        fs::write(paths.salt(), salt).unwrap();
        paths
    }

    fn password_file(dir: &TempDir, password: &str) -> PasswordSource {
        let path = dir.path().join("password.txt");
        fs::write(&path, password).unwrap();
        PasswordSource::File(path.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_unlock_with_password_file() {
        let temp_dir = TempDir::new().unwrap();
        let paths = write_sealed(&temp_dir, "correct");
        let source = password_file(&temp_dir, "correct");

        let store = unlock_store(IdentityStore::new(paths), source).await.unwrap();
        assert_eq!(store.state(), StoreState::Ready);
    }

    #[tokio::test]
    async fn test_wrong_password_file_fails_once() {
        let temp_dir = TempDir::new().unwrap();
        let paths = write_sealed(&temp_dir, "correct");
        let source = password_file(&temp_dir, "wrong");

        let err = unlock_store(IdentityStore::new(paths), source)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Incorrect password (1 attempt(s))"));
    }

    #[tokio::test]
    async fn test_plain_identity_needs_no_password() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp_dir.path());
        fs::create_dir_all(paths.identity_dir()).unwrap();
        fs::write(paths.identity_key(), [0x42; 64]).unwrap();

        let source = PasswordSource::File("/nonexistent/password".to_string());
        let store = unlock_store(IdentityStore::new(paths), source).await.unwrap();
        assert_eq!(store.state(), StoreState::Ready);
    }

    #[tokio::test]
    async fn test_missing_identity_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp_dir.path());

        let source = PasswordSource::File("/nonexistent/password".to_string());
        let err = unlock_store(IdentityStore::new(paths), source)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No identity found"));
    }
}
