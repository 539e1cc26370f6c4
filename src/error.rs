//! Error types for docvault.
//!
//! Each layer owns one enum. The cryptography engine and the storage
//! back-ends never swallow failures; `VaultError` is the small public
//! vocabulary the document vault service translates them into. Messages say
//! what failed and never carry key material, owner strings, or plaintext.

use thiserror::Error;

use crate::keys::KeyIdentifier;

/// Failures of the cryptography engine and the storage key deriver.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The blob (or document id) names a key identifier that is not in the
    /// current key ring. Permanent; retrying cannot help.
    #[error("no decryption key registered for identifier {0}")]
    KeyNotFound(KeyIdentifier),

    /// The GCM tag did not verify: tampered ciphertext, or a different
    /// owner/document id than the one used at encryption time.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The serialized blob could not be parsed.
    #[error("malformed encrypted blob: {0}")]
    MalformedBlob(&'static str),

    /// The underlying `ring` seal operation returned an error.
    #[error("encryption failed")]
    EncryptionFailure,

    /// Key derivation (HKDF) failed.
    #[error("key derivation failed")]
    KeyDerivationFailure,

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// Key bytes were rejected by the cipher.
    #[error("invalid key")]
    InvalidKey,
}

/// Failures while constructing a [`KeyRing`](crate::keys::KeyRing).
#[derive(Debug, Error)]
pub enum KeyRingError {
    #[error("key identifier must be a positive integer, got {0}")]
    InvalidIdentifier(u32),

    #[error("passphrase for key identifier {0} is empty")]
    EmptyPassphrase(KeyIdentifier),

    #[error("active key identifier {0} is missing from the decryption keys")]
    ActiveKeyMissing(KeyIdentifier),

    #[error("decryption key {0} does not match the active passphrase")]
    ActiveKeyMismatch(KeyIdentifier),
}

/// Failures reported by a [`Storage`](crate::storage::Storage) back-end.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transient back-end failure. Safe to retry at the caller.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Deletion was refused because the object carries a retention hold.
    #[error("object is under retention hold")]
    RetentionHold,

    #[error("invalid object key")]
    InvalidKey,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// The public error vocabulary of the document vault service.
///
/// There is no not-found variant: an unknown document is `Ok(None)` or
/// `Ok(false)`. Authentication failures fold into the same empty result.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The document was written under a key that is no longer in the ring.
    #[error("document unavailable: key {0} is not in the key ring")]
    KeyNotFound(KeyIdentifier),

    /// Transient storage failure (I/O error, missing bucket, deadline).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Delete attempted while the retention hold is set.
    #[error("document is under retention hold")]
    HoldViolation,

    #[error("invalid document id")]
    InvalidDocumentId,

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other engine failure (randomness, key derivation).
    #[error("cryptographic failure: {0}")]
    Crypto(CryptoError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Failures while loading configuration. Any of these stops the process
/// before it serves a request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(String),

    #[error("setting {name} has an invalid value: {reason}")]
    Invalid { name: String, reason: String },

    #[error(transparent)]
    KeyRing(#[from] KeyRingError),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyNotFound(id) => Self::KeyNotFound(id),
            other => Self::Crypto(other),
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RetentionHold => Self::HoldViolation,
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}
