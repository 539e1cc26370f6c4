//! Key ring and key derivation.
//!
//! This module owns two responsibilities:
//! 1. Holding the rotating set of passphrases as a [`KeyRing`]: one active
//!    identifier used for new writes, and every identifier still allowed to
//!    decrypt.
//! 2. Deriving per-document keys from those passphrases using HKDF-SHA256,
//!    in types that are opaque, non-cloneable, and zeroised on drop.
//!
//! This is one of exactly two modules permitted to import `ring` directly
//! (the other is `crypto`).
//!
//! ## Derivation structure
//!
//! ```text
//! root    = HKDF-Extract(salt = "docvault/passphrase/v1", ikm = passphrase)
//! derived = HKDF-Expand(root, info = DOMAIN || purpose || len(id) || id || len(owner) || owner)
//! ```
//!
//! Lengths are 8-byte big-endian, so distinct (document id, owner) pairs
//! always produce distinct info strings.

use std::collections::HashMap;
use std::fmt;

use ring::hkdf;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_LEN, NONCE_LEN};
use crate::error::{CryptoError, KeyRingError};

const PASSPHRASE_SALT: &[u8] = b"docvault/passphrase/v1";
const DOMAIN: &[u8] = b"docvault/derive/v1";

// ---------------------------------------------------------------------------
// Identifiers and passphrases
// ---------------------------------------------------------------------------

/// Stable identity of one passphrase version. Always positive; never reused
/// for two different passphrase values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct KeyIdentifier(u32);

impl KeyIdentifier {
    pub fn new(value: u32) -> Result<Self, KeyRingError> {
        if value == 0 {
            return Err(KeyRingError::InvalidIdentifier(0));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for KeyIdentifier {
    type Error = KeyRingError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeyIdentifier> for u32 {
    fn from(id: KeyIdentifier) -> Self {
        id.0
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured passphrase. Zeroised on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Root key
// ---------------------------------------------------------------------------

/// The stretched form of one passphrase. The passphrase itself is not kept.
pub struct RootKey {
    prk: hkdf::Prk,
}

impl RootKey {
    fn from_passphrase(passphrase: &Passphrase) -> Self {
        let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, PASSPHRASE_SALT);
        Self {
            prk: salt.extract(passphrase.as_bytes()),
        }
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Key ring
// ---------------------------------------------------------------------------

/// One active encryption key plus every key still allowed to decrypt.
///
/// Immutable after construction. Rotating means building a new ring whose
/// active identifier is new and whose decryption set is the old set plus
/// the new entry.
pub struct KeyRing {
    active: KeyIdentifier,
    keys: HashMap<KeyIdentifier, RootKey>,
}

impl KeyRing {
    /// Build a key ring.
    ///
    /// `decryption_keys` must contain `active_identifier` mapped to exactly
    /// `active_passphrase`: the active key is looked up through the same path
    /// as retired ones, so encrypt-time and decrypt-time lookups agree.
    pub fn new(
        active_identifier: KeyIdentifier,
        active_passphrase: Passphrase,
        decryption_keys: HashMap<KeyIdentifier, Passphrase>,
    ) -> Result<Self, KeyRingError> {
        if active_passphrase.is_empty() {
            return Err(KeyRingError::EmptyPassphrase(active_identifier));
        }
        if let Some((id, _)) = decryption_keys.iter().find(|(_, p)| p.is_empty()) {
            return Err(KeyRingError::EmptyPassphrase(*id));
        }

        match decryption_keys.get(&active_identifier) {
            None => return Err(KeyRingError::ActiveKeyMissing(active_identifier)),
            Some(p) if p.as_bytes() != active_passphrase.as_bytes() => {
                return Err(KeyRingError::ActiveKeyMismatch(active_identifier));
            }
            Some(_) => {}
        }

        let keys = decryption_keys
            .iter()
            .map(|(id, passphrase)| (*id, RootKey::from_passphrase(passphrase)))
            .collect();

        Ok(Self {
            active: active_identifier,
            keys,
        })
    }

    /// A ring with a single key that is both active and the only decryption key.
    pub fn single(
        identifier: KeyIdentifier,
        passphrase: impl Into<Passphrase>,
    ) -> Result<Self, KeyRingError> {
        let passphrase: Passphrase = passphrase.into();
        let copy = passphrase.clone();
        Self::new(identifier, passphrase, HashMap::from([(identifier, copy)]))
    }

    /// The identifier new blobs are tagged with.
    pub fn active_identifier(&self) -> KeyIdentifier {
        self.active
    }

    /// Look up the key registered under `identifier`.
    pub fn lookup(&self, identifier: KeyIdentifier) -> Result<&RootKey, CryptoError> {
        self.keys
            .get(&identifier)
            .ok_or(CryptoError::KeyNotFound(identifier))
    }

    pub fn contains(&self, identifier: KeyIdentifier) -> bool {
        self.keys.contains_key(&identifier)
    }

    /// All identifiers that can decrypt, in ascending order.
    pub fn identifiers(&self) -> Vec<KeyIdentifier> {
        let mut ids: Vec<_> = self.keys.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("active", &self.active)
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Derived key
// ---------------------------------------------------------------------------

/// A key derived for one purpose and one (document id, owner) context.
///
/// Not `Clone`, zeroised on drop. Raw bytes only leave this module through
/// the crate-private `as_bytes`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// What a derived value is used for. Each purpose yields an independent
/// key for the same context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    Document,
    StorageKey,
    StorageKeyNonce,
}

impl Purpose {
    fn tag(self) -> &'static [u8] {
        match self {
            Self::Document => &[0x01],
            Self::StorageKey => &[0x02],
            Self::StorageKeyNonce => &[0x03],
        }
    }
}

struct OutputLen(usize);

impl hkdf::KeyType for OutputLen {
    fn len(&self) -> usize {
        self.0
    }
}

fn expand_into(
    root: &RootKey,
    purpose: Purpose,
    document_id: &str,
    owner: &str,
    out: &mut [u8],
) -> Result<(), CryptoError> {
    let id_len = (document_id.len() as u64).to_be_bytes();
    let owner_len = (owner.len() as u64).to_be_bytes();
    let info: [&[u8]; 6] = [
        DOMAIN,
        purpose.tag(),
        &id_len,
        document_id.as_bytes(),
        &owner_len,
        owner.as_bytes(),
    ];

    let okm = root
        .prk
        .expand(&info, OutputLen(out.len()))
        .map_err(|_| CryptoError::KeyDerivationFailure)?;
    okm.fill(out).map_err(|_| CryptoError::KeyDerivationFailure)
}

/// Derive the symmetric key for `purpose` bound to `(document_id, owner)`.
pub(crate) fn derive_key(
    root: &RootKey,
    purpose: Purpose,
    document_id: &str,
    owner: &str,
) -> Result<DerivedKey, CryptoError> {
    let mut bytes = [0u8; KEY_LEN];
    expand_into(root, purpose, document_id, owner, &mut bytes)?;
    Ok(DerivedKey { bytes })
}

/// Derive a repeatable nonce bound to `(document_id, owner)`. Used only where
/// the output must be deterministic (storage keys).
pub(crate) fn derive_nonce(
    root: &RootKey,
    document_id: &str,
    owner: &str,
) -> Result<[u8; NONCE_LEN], CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    expand_into(root, Purpose::StorageKeyNonce, document_id, owner, &mut nonce)?;
    Ok(nonce)
}
