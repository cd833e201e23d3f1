//! Authenticated encryption for the at-rest identity bundle
//!
//! A sealed payload is laid out as:
//!
//! ```text
//! ┌──────────┬────────────────────────────┬──────────────────────┐
//! │ IV (16)  │ AES-128-CBC ciphertext     │ HMAC-SHA256 tag (32) │
//! └──────────┴────────────────────────────┴──────────────────────┘
//! │◄──────── authenticated region ───────►│
//! ```
//!
//! The tag covers the IV and the ciphertext. Opening verifies the tag in
//! constant time before the body is touched; ciphertext that fails
//! authentication is never decrypted.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::hmac;
use thiserror::Error;
use zeroize::Zeroizing;

use super::key_material::KeyMaterial;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// CBC initialisation vector length (one AES block)
pub const IV_LEN: usize = 16;

/// HMAC-SHA256 tag length
pub const TAG_LEN: usize = 32;

/// AES block size
const BLOCK_LEN: usize = 16;

/// Smallest well-formed sealed payload: IV, one ciphertext block, tag
pub const MIN_SEALED_LEN: usize = IV_LEN + BLOCK_LEN + TAG_LEN;

/// Errors that can occur while opening a sealed payload
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SealError {
    /// Payload cannot hold an IV, a ciphertext block and a tag
    #[error("Sealed payload too short: {0} bytes")]
    Truncated(usize),

    /// Tag mismatch: wrong password or tampered payload
    #[error("Authentication failed: tag mismatch")]
    Authentication,

    /// Authenticated body does not decrypt to a padded plaintext
    #[error("Decryption failed: invalid block alignment or padding")]
    Padding,
}

/// Verify and decrypt a sealed payload.
///
/// Steps:
/// 1. Split the trailing 32-byte tag from the authenticated region
/// 2. Verify HMAC-SHA256(mac_key, region) against the tag in constant time
/// 3. Decrypt `region[16..]` with AES-128-CBC, IV = `region[..16]`
///
/// Returns `SealError::Authentication` without decrypting when the tag does
/// not match.
pub fn open(material: &KeyMaterial, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, SealError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(SealError::Truncated(sealed.len()));
    }

    let (region, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mac_key = hmac::Key::new(hmac::HMAC_SHA256, material.mac_key());
    hmac::verify(&mac_key, region, tag).map_err(|_| SealError::Authentication)?;

    let (iv, body) = region
        .split_first_chunk::<IV_LEN>()
        .ok_or(SealError::Truncated(sealed.len()))?;
    if body.len() % BLOCK_LEN != 0 {
        return Err(SealError::Padding);
    }

    let key = *material.encryption_key();
    let plaintext = Aes128CbcDec::new(&key.into(), &(*iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| SealError::Padding)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt and authenticate `plaintext`, producing `IV || ciphertext || tag`.
///
/// PKCS#7 always appends padding, so a plaintext that is a multiple of the
/// block size gains one full block.
pub fn seal(material: &KeyMaterial, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let key = *material.encryption_key();
    let ciphertext = Aes128CbcEnc::new(&key.into(), &(*iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut sealed = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(iv);
    sealed.extend_from_slice(&ciphertext);

    let mac_key = hmac::Key::new(hmac::HMAC_SHA256, material.mac_key());
    let tag = hmac::sign(&mac_key, &sealed);
    sealed.extend_from_slice(tag.as_ref());

    sealed
}

/// Length of the sealed form of a plaintext of `plaintext_len` bytes.
pub const fn sealed_len(plaintext_len: usize) -> usize {
    IV_LEN + (plaintext_len / BLOCK_LEN + 1) * BLOCK_LEN + TAG_LEN
}
