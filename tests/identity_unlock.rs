// Integration tests for the identity store unlock flow.
// Fixtures are written to a temporary data directory in the on-disk layout
// the store reads at startup.

use std::fs;

use sigil::crypto::sealed::IV_LEN;
use sigil::crypto::{seal, KeyMaterial};
use sigil::store::{
    prompt_channel, submission_channel, unlock, IdentityStore, PasswordPrompt, PasswordSubmitted,
    StoragePaths, StoreError, StoreEvent, StoreState, UnlockError,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

const SALT: [u8; 8] = [0x73, 0x69, 0x67, 0x69, 0x6c, 0x2d, 0x30, 0x31];

struct NoPrompt;

impl PasswordPrompt for NoPrompt {
    fn prompt_password(&self) {}
}

fn plain_bundle() -> Vec<u8> {
    (0u8..64).collect()
}

fn provision_sealed(dir: &TempDir, password: &str) -> StoragePaths {
    let paths = StoragePaths::new(dir.path());
    let material = KeyMaterial::derive(password, &SALT).unwrap();
    let sealed = seal(&material, &[0xA5; IV_LEN], &plain_bundle());
    assert_eq!(sealed.len(), 128);

    fs::create_dir_all(paths.identity_dir()).unwrap();
    fs::write(paths.identity_key(), sealed).unwrap();
    fs::write(paths.salt(), SALT).unwrap();
    paths
}

#[test]
fn test_correct_password_reaches_ready() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = IdentityStore::new(provision_sealed(&temp_dir, "correct"));

    assert_eq!(
        store.load_identity(&NoPrompt).unwrap(),
        StoreState::AwaitingPassword
    );
    assert_eq!(store.supply_password("correct").unwrap(), StoreEvent::Ready);

    let identity = store.identity().unwrap();
    assert_eq!(identity.as_bytes(), plain_bundle().as_slice());
    assert_eq!(identity.public_key(), &plain_bundle()[..32]);
}

#[test]
fn test_wrong_then_correct_password() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = IdentityStore::new(provision_sealed(&temp_dir, "correct"));
    store.load_identity(&NoPrompt).unwrap();

    for _ in 0..3 {
        assert_eq!(
            store.supply_password("wrong").unwrap(),
            StoreEvent::DecryptionFailure
        );
        assert_eq!(store.state(), StoreState::AwaitingPassword);
        assert!(store.identity().is_none());
    }

    assert_eq!(store.supply_password("correct").unwrap(), StoreEvent::Ready);
    assert_eq!(store.state(), StoreState::Ready);
}

#[test]
fn test_tampered_bundle_never_decrypts() {
    let temp_dir = TempDir::new().unwrap();
    let paths = provision_sealed(&temp_dir, "correct");

    let mut bytes = fs::read(paths.identity_key()).unwrap();
    bytes[40] ^= 0x01;
    fs::write(paths.identity_key(), bytes).unwrap();

    let mut store = IdentityStore::new(paths);
    store.load_identity(&NoPrompt).unwrap();
    assert_eq!(
        store.supply_password("correct").unwrap(),
        StoreEvent::DecryptionFailure
    );
}

#[test]
fn test_corrupt_length_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let paths = StoragePaths::new(temp_dir.path());
    fs::create_dir_all(paths.identity_dir()).unwrap();
    fs::write(paths.identity_key(), [0u8; 100]).unwrap();

    let err = IdentityStore::new(paths)
        .load_identity(&NoPrompt)
        .unwrap_err();
    assert!(matches!(err, StoreError::CorruptIdentity(100)));
    assert!(err.is_fatal());
}

#[test]
fn test_sealed_bundle_without_salt_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let paths = provision_sealed(&temp_dir, "correct");
    fs::remove_file(paths.salt()).unwrap();

    let mut store = IdentityStore::new(paths);
    store.load_identity(&NoPrompt).unwrap();

    let err = store.supply_password("correct").unwrap_err();
    assert!(matches!(err, StoreError::MissingSalt(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_channel_driven_unlock_retries() {
    let temp_dir = TempDir::new().unwrap();
    let store = IdentityStore::new(provision_sealed(&temp_dir, "correct"));

    let (prompt, mut requests) = prompt_channel();
    let (submit, submissions) = submission_channel();
    let (events, mut event_rx) = mpsc::unbounded_channel();

    let host = tokio::spawn(async move {
        let mut seen = Vec::new();
        for password in ["wrong", "correct"] {
            let request = requests.recv().await.unwrap();
            seen.push(request.attempt);
            submit.send(PasswordSubmitted::new(password)).await.unwrap();
        }
        seen
    });

    let store = unlock(store, &prompt, submissions, &events).await.unwrap();
    assert_eq!(store.state(), StoreState::Ready);
    assert_eq!(host.await.unwrap(), vec![1, 2]);

    assert_eq!(event_rx.recv().await, Some(StoreEvent::DecryptionFailure));
    assert_eq!(event_rx.recv().await, Some(StoreEvent::Ready));
}

#[tokio::test]
async fn test_closed_prompt_ends_unlock() {
    let temp_dir = TempDir::new().unwrap();
    let store = IdentityStore::new(provision_sealed(&temp_dir, "correct"));

    let (prompt, _requests) = prompt_channel();
    let (submit, submissions) = submission_channel();
    let (events, _event_rx) = mpsc::unbounded_channel();
    drop(submit);

    let err = unlock(store, &prompt, submissions, &events)
        .await
        .unwrap_err();
    assert!(matches!(err, UnlockError::PromptClosed));
}
