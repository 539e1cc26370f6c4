//! The encrypted blob and its wire format.
//!
//! # Layout
//! ```text
//! [ version (1) ][ key identifier (4, BE) ][ nonce (12) ][ ciphertext (n) ][ GCM tag (16) ]
//! ```
//!
//! The first five bytes form the header. The header is passed to AES-GCM as
//! associated data, so rewriting the key identifier of a stored blob makes it
//! fail authentication rather than decrypt under some other key.
//!
//! Stored values use the raw bytes. Storage keys use the string form:
//! unpadded URL-safe base64 of the same bytes, which is safe as an object
//! name on every back-end.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::error::CryptoError;
use crate::keys::KeyIdentifier;

/// Current wire format version.
pub const FORMAT_VERSION: u8 = 1;

/// Length of the authenticated header.
pub const HEADER_LEN: usize = 1 + 4;

const MIN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Output of one authenticated encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// The key that produced this blob. Decryption looks it up directly.
    pub key_identifier: KeyIdentifier,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl EncryptedBlob {
    /// The bytes authenticated as associated data for a given key identifier.
    pub(crate) fn header(key_identifier: KeyIdentifier) -> [u8; HEADER_LEN] {
        let id = key_identifier.get().to_be_bytes();
        [FORMAT_VERSION, id[0], id[1], id[2], id[3]]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_LEN + self.ciphertext.len());
        out.extend_from_slice(&Self::header(self.key_identifier));
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_LEN {
            return Err(CryptoError::MalformedBlob("too short"));
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(CryptoError::MalformedBlob("unsupported version"));
        }

        let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let key_identifier =
            KeyIdentifier::new(id).map_err(|_| CryptoError::MalformedBlob("invalid key identifier"))?;

        let (nonce_bytes, rest) = bytes[HEADER_LEN..].split_at(NONCE_LEN);
        let (ciphertext, tag_bytes) = rest.split_at(rest.len() - TAG_LEN);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_bytes);

        Ok(Self {
            key_identifier,
            nonce,
            ciphertext: ciphertext.to_vec(),
            tag,
        })
    }

    /// Single-string form, usable as an object name.
    pub fn to_encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CryptoError::MalformedBlob("invalid encoding"))?;
        Self::from_bytes(&bytes)
    }
}
