//! Password-based key derivation for the sealed identity bundle
//!
//! The at-rest identity bundle is protected by keys derived from the user's
//! password with PBKDF2-HMAC-SHA1. The parameters are fixed so that bundles
//! written by earlier installations stay readable.
//!
//! ## Key Layout
//!
//! ```text
//! PBKDF2-HMAC-SHA1(password, salt, 1024 rounds) → 36 bytes
//!         │
//!         ├─► bytes  0..16 → AES-128 encryption key
//!         └─► bytes 16..36 → HMAC-SHA256 MAC key
//! ```
//!
//! Key material lives only for the duration of one unlock attempt. Every
//! resubmitted password gets a fresh derivation.

use ring::pbkdf2;
use std::fmt;
use std::num::NonZeroU32;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2 iteration count used for every identity bundle.
pub const KDF_ITERATIONS: u32 = 1024;

/// Length of the AES-128 encryption key.
pub const ENCRYPTION_KEY_LEN: usize = 16;

/// Length of the HMAC-SHA256 MAC key.
pub const MAC_KEY_LEN: usize = 20;

/// Total PBKDF2 output length.
pub const KEY_MATERIAL_LEN: usize = ENCRYPTION_KEY_LEN + MAC_KEY_LEN;

/// Errors that can occur during key derivation
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KdfError {
    /// PBKDF2 requires at least one iteration
    #[error("Key derivation failed: iteration count must be non-zero")]
    InvalidIterationCount,
}

/// Derived encryption and MAC keys for one unlock attempt.
///
/// # Security
///
/// - Both keys are zeroized on drop
/// - `Debug` never prints key bytes
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    encryption_key: [u8; ENCRYPTION_KEY_LEN],
    mac_key: [u8; MAC_KEY_LEN],
}

impl KeyMaterial {
    /// Derive key material from a password and the stored salt.
    ///
    /// The password is encoded as UTF-8. Derivation is deterministic: the
    /// same `(password, salt)` pair always yields the same keys.
    pub fn derive(password: &str, salt: &[u8]) -> Result<Self, KdfError> {
        Self::derive_with_iterations(password, salt, KDF_ITERATIONS)
    }

    fn derive_with_iterations(
        password: &str,
        salt: &[u8],
        iterations: u32,
    ) -> Result<Self, KdfError> {
        let iterations = NonZeroU32::new(iterations).ok_or(KdfError::InvalidIterationCount)?;

        let mut output = [0u8; KEY_MATERIAL_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA1,
            iterations,
            salt,
            password.as_bytes(),
            &mut output,
        );

        let material = Self::from_bytes(&output);
        output.zeroize();
        tracing::trace!(salt_len = salt.len(), "derived identity key material");

        Ok(material)
    }

    /// Build key material from a raw 36-byte PBKDF2 output.
    pub fn from_bytes(bytes: &[u8; KEY_MATERIAL_LEN]) -> Self {
        let mut encryption_key = [0u8; ENCRYPTION_KEY_LEN];
        let mut mac_key = [0u8; MAC_KEY_LEN];
        encryption_key.copy_from_slice(&bytes[..ENCRYPTION_KEY_LEN]);
        mac_key.copy_from_slice(&bytes[ENCRYPTION_KEY_LEN..]);

        Self {
            encryption_key,
            mac_key,
        }
    }

    /// AES-128 key (bytes 0..16 of the derivation)
    pub fn encryption_key(&self) -> &[u8; ENCRYPTION_KEY_LEN] {
        &self.encryption_key
    }

    /// HMAC-SHA256 key (bytes 16..36 of the derivation)
    pub fn mac_key(&self) -> &[u8; MAC_KEY_LEN] {
        &self.mac_key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("encryption_key", &"<redacted>")
            .field("mac_key", &"<redacted>")
            .finish()
    }
}
