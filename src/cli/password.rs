//! Password input for the CLI
//!
//! Sources are checked in order: `--password-file`, the `SIGIL_PASSWORD`
//! environment variable, then a masked prompt on the terminal.

use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

/// Environment variable consulted when no password file is given
pub const PASSWORD_ENV: &str = "SIGIL_PASSWORD";

pub type PasswordResult = Result<Zeroizing<String>, Box<dyn std::error::Error + Send + Sync>>;

/// Modes for password delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSource {
    /// From --password-file /path/to/file (container-native)
    File(String),
    /// From SIGIL_PASSWORD (fallback, warned as insecure)
    EnvVar,
    /// Masked terminal prompt
    Stdin,
}

impl PasswordSource {
    /// Only a terminal prompt can offer a second attempt
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Stdin)
    }
}

/// Determine password source from CLI arguments
pub fn determine_password_source(password_file: Option<String>) -> PasswordSource {
    if let Some(file) = password_file {
        PasswordSource::File(file)
    } else if std::env::var_os(PASSWORD_ENV).is_some() {
        PasswordSource::EnvVar
    } else {
        PasswordSource::Stdin
    }
}

/// Read a password from `source`. Empty passwords are rejected.
pub fn read_password(source: &PasswordSource, prompt: &str) -> PasswordResult {
    let password = match source {
        PasswordSource::File(path) => {
            if !Path::new(path).exists() {
                return Err(format!("Password file not found: {}", path).into());
            }
            let contents = Zeroizing::new(
                fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read password file: {}", e))?,
            );
            Zeroizing::new(contents.trim_end_matches(['\r', '\n']).to_string())
        }
        PasswordSource::EnvVar => {
            eprintln!("⚠️  WARNING: Using {PASSWORD_ENV} env var is insecure");
            eprintln!("   Consider using --password-file instead");

            Zeroizing::new(
                std::env::var(PASSWORD_ENV)
                    .map_err(|_| format!("{PASSWORD_ENV} env var not set"))?,
            )
        }
        PasswordSource::Stdin => Zeroizing::new(
            rpassword::prompt_password(prompt)
                .map_err(|e| format!("Failed to read password from terminal: {}", e))?,
        ),
    };

    if password.is_empty() {
        return Err("Password cannot be empty".into());
    }
    Ok(password)
}

/// Read a new password, asking twice when prompting interactively
pub fn read_new_password(source: &PasswordSource) -> PasswordResult {
    let password = read_password(source, "New identity password: ")?;
    if source.is_interactive() {
        let confirm = read_password(source, "Repeat password: ")?;
        if *confirm != *password {
            return Err("Passwords do not match".into());
        }
    }
    Ok(password)
}
