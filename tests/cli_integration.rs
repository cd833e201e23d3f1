// Integration tests for CLI commands.
// Each test runs the built binary against its own temporary data directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn sigil(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sigil"))
        .args(args)
        .arg("--data-dir")
        .arg(data_dir)
        .env_remove("SIGIL_PASSWORD")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn provision_plain(data_dir: &Path) {
    let identity_dir = data_dir.join("storage").join("identity");
    fs::create_dir_all(&identity_dir).unwrap();
    fs::write(identity_dir.join("identity_key"), [0x5a; 64]).unwrap();
}

fn password_file(dir: &TempDir, name: &str, password: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, format!("{}\n", password)).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_sigil"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("unlock"));
    assert!(stdout.contains("seal"));
    assert!(stdout.contains("status"));
    assert!(stdout.contains("version"));
}

#[test]
fn test_cli_version() {
    let temp_dir = TempDir::new().unwrap();
    let output = sigil(temp_dir.path(), &["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("sigil {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_status_json_missing_identity() {
    let temp_dir = TempDir::new().unwrap();
    let output = sigil(temp_dir.path(), &["status", "--json"]);

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["identity"], "missing");
}

#[test]
fn test_unlock_without_identity_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = sigil(temp_dir.path(), &["unlock"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No identity found"));
}

#[test]
fn test_seal_then_unlock() {
    let data_dir = TempDir::new().unwrap();
    let secrets = TempDir::new().unwrap();
    provision_plain(data_dir.path());

    let plain = sigil(data_dir.path(), &["status", "--json"]);
    let plain: serde_json::Value = serde_json::from_slice(&plain.stdout).unwrap();
    assert_eq!(plain["identity"], "plain");
    let fingerprint = plain["fingerprint"].as_str().unwrap().to_string();

    let correct = password_file(&secrets, "correct.txt", "correct");
    let output = sigil(data_dir.path(), &["seal", "--password-file", &correct]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let sealed = sigil(data_dir.path(), &["status", "--json"]);
    let sealed: serde_json::Value = serde_json::from_slice(&sealed.stdout).unwrap();
    assert_eq!(sealed["identity"], "sealed");
    assert_eq!(sealed["salt_present"], true);

    let output = sigil(data_dir.path(), &["unlock", "--password-file", &correct]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&fingerprint));
}

#[test]
fn test_unlock_with_wrong_password_fails() {
    let data_dir = TempDir::new().unwrap();
    let secrets = TempDir::new().unwrap();
    provision_plain(data_dir.path());

    let correct = password_file(&secrets, "correct.txt", "correct");
    let wrong = password_file(&secrets, "wrong.txt", "wrong");
    assert!(sigil(data_dir.path(), &["seal", "--password-file", &correct])
        .status
        .success());

    let output = sigil(data_dir.path(), &["unlock", "--password-file", &wrong]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Incorrect password"));
}

#[test]
fn test_init_config_writes_file() {
    let temp_dir = TempDir::new().unwrap();
    let output = sigil(temp_dir.path(), &["init-config"]);

    assert!(output.status.success());
    let contents = fs::read_to_string(temp_dir.path().join("config.toml")).unwrap();
    assert!(contents.contains("[storage]"));

    let again = sigil(temp_dir.path(), &["init-config"]);
    assert!(!again.status.success());
}
