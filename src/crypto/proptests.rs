//! Property-based tests for identity bundle cryptography
//!
//! Tests for:
//! - Key derivation: determinism, 16/20-byte split
//! - Sealing: roundtrip of 64-byte bundles, single-byte tamper detection

use super::key_material::{KeyMaterial, KEY_MATERIAL_LEN};
use super::sealed::{open, seal, SealError, IV_LEN};
use proptest::prelude::*;

// The KDF is deliberately slow; keep case counts modest.
fn config() -> ProptestConfig {
    ProptestConfig::with_cases(32)
}

proptest! {
    #![proptest_config(config())]

    /// Property: Derivation is deterministic for identical (salt, password)
    #[test]
    fn derivation_is_deterministic(
        salt in prop::collection::vec(any::<u8>(), 1..32),
        password in ".{0,32}",
    ) {
        let first = KeyMaterial::derive(&password, &salt).unwrap();
        let second = KeyMaterial::derive(&password, &salt).unwrap();

        prop_assert_eq!(first.encryption_key(), second.encryption_key());
        prop_assert_eq!(first.mac_key(), second.mac_key());
    }

    /// Property: Key material is exactly 36 bytes split 16 / 20
    #[test]
    fn key_material_split_covers_output(
        raw in prop::array::uniform32(any::<u8>()),
        tail in prop::array::uniform4(any::<u8>()),
    ) {
        let mut bytes = [0u8; KEY_MATERIAL_LEN];
        bytes[..32].copy_from_slice(&raw);
        bytes[32..].copy_from_slice(&tail);

        let material = KeyMaterial::from_bytes(&bytes);
        let mut joined = material.encryption_key().to_vec();
        joined.extend_from_slice(material.mac_key());

        prop_assert_eq!(joined.as_slice(), &bytes[..]);
    }

    /// Property: Any 64-byte plain bundle survives seal then open
    #[test]
    fn plain_bundle_roundtrip(
        bundle in prop::collection::vec(any::<u8>(), 64),
        iv in prop::array::uniform16(any::<u8>()),
        password in "[a-zA-Z0-9]{1,16}",
    ) {
        let material = KeyMaterial::derive(&password, b"saltsalt").unwrap();
        let sealed = seal(&material, &iv, &bundle);
        prop_assert_eq!(sealed.len(), 128);

        let opened = open(&material, &sealed).unwrap();
        prop_assert_eq!(opened.as_slice(), bundle.as_slice());
    }

    /// Property: Flipping any single byte of the sealed bundle fails
    /// authentication rather than yielding a wrong plaintext
    #[test]
    fn single_byte_tamper_is_detected(
        bundle in prop::collection::vec(any::<u8>(), 64),
        iv in prop::array::uniform16(any::<u8>()),
        position in 0usize..128,
        flip in 1u8..=255,
    ) {
        let material = KeyMaterial::derive("correct", b"saltsalt").unwrap();
        let mut sealed = seal(&material, &iv, &bundle);
        sealed[position] ^= flip;

        prop_assert_eq!(open(&material, &sealed).unwrap_err(), SealError::Authentication);
    }

    /// Property: A different password never opens the bundle
    #[test]
    fn wrong_password_is_rejected(
        bundle in prop::collection::vec(any::<u8>(), 64),
        correct in "[a-z]{1,12}",
        wrong in "[A-Z]{1,12}",
    ) {
        let material = KeyMaterial::derive(&correct, b"saltsalt").unwrap();
        let sealed = seal(&material, &[0u8; IV_LEN], &bundle);

        let other = KeyMaterial::derive(&wrong, b"saltsalt").unwrap();
        prop_assert_eq!(open(&other, &sealed).unwrap_err(), SealError::Authentication);
    }
}
