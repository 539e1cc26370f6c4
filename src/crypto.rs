//! Low-level cryptographic operations.
//!
//! This module is one of exactly two places in the crate that import `ring`
//! directly (the other is `keys`). The engine performs encryption and
//! decryption exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), fresh from `SystemRandom` for payloads,
//!   derived for storage keys
//! - **Key size**: 256 bits (32 bytes)

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::CryptoError;

const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a derived key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

fn key(key_bytes: &[u8; KEY_LEN]) -> Result<LessSafeKey, CryptoError> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes).map_err(|_| CryptoError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Fill `buf` from the system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::RandomnessFailure)
}

/// Generate a fresh random nonce.
pub fn random_nonce() -> Result<[u8; NONCE_LEN], CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

/// Encrypt `plaintext` and return `(ciphertext, tag)`.
///
/// `aad` is authenticated but not encrypted. The caller owns nonce
/// uniqueness: a given key must never see the same nonce with two different
/// plaintexts.
pub fn seal(
    key_bytes: &[u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN]), CryptoError> {
    let key = key(key_bytes)?;
    let mut in_out = plaintext.to_vec();

    let tag = key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(aad),
            &mut in_out,
        )
        .map_err(|_| CryptoError::EncryptionFailure)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());
    Ok((in_out, tag_bytes))
}

/// Authenticate and decrypt.
///
/// A wrong key, wrong `aad`, or any modified byte fails the GCM check; the
/// caller receives no partial plaintext.
pub fn open(
    key_bytes: &[u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let key = key(key_bytes)?;

    let mut in_out = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(tag);

    let plaintext = key
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = [7u8; KEY_LEN];
        let nonce = random_nonce().unwrap();
        let (ct, tag) = seal(&key, nonce, b"header", b"attack at dawn").unwrap();

        assert_ne!(&ct[..], b"attack at dawn");
        assert_eq!(open(&key, nonce, b"header", &ct, &tag).unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_open_rejects_wrong_aad_and_flipped_bits() {
        let key = [7u8; KEY_LEN];
        let nonce = random_nonce().unwrap();
        let (mut ct, tag) = seal(&key, nonce, b"header", b"payload").unwrap();

        assert!(matches!(
            open(&key, nonce, b"other", &ct, &tag),
            Err(CryptoError::AuthenticationFailed)
        ));

        ct[0] ^= 0x01;
        assert!(matches!(
            open(&key, nonce, b"header", &ct, &tag),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_nonces_differ() {
        assert_ne!(random_nonce().unwrap(), random_nonce().unwrap());
    }
}
