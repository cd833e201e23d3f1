/// Cryptographic primitives for the at-rest identity bundle
///
/// This module implements:
/// - Password-based key derivation (PBKDF2-HMAC-SHA1, fixed parameters)
/// - Authenticated decryption of sealed bundles (AES-128-CBC + HMAC-SHA256)
pub mod key_material;
pub mod sealed;

#[cfg(test)]
mod proptests;

pub use key_material::{KdfError, KeyMaterial, KDF_ITERATIONS, KEY_MATERIAL_LEN};
pub use sealed::{open, seal, SealError};
