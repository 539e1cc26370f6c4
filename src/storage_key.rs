//! Storage key derivation.
//!
//! The object name a document is stored under is itself ciphertext: the
//! deterministic encryption of `"{owner}-{document id}"`, bound to the same
//! (document id, owner) context, under the key named by the document id.
//!
//! Nothing is persisted to map ids to object names. The key is recomputed on
//! every access, which means:
//! - object names reveal nothing about owner or document identity;
//! - there is no way to list an owner's documents;
//! - a lost document id makes its document unreachable.

use std::fmt;

use crate::document::{DocumentId, Owner};
use crate::engine::{BindingContext, CryptoEngine};
use crate::envelope::EncryptedBlob;
use crate::error::CryptoError;

/// An opaque object name in the storage back-end.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

fn clear_value(owner: &Owner, document_id: &DocumentId) -> String {
    format!("{}-{}", owner.as_str(), document_id.as_str())
}

/// Derive the storage key for `(owner, document_id)`.
///
/// Pure and repeatable for any key ring that holds the document id's key
/// identifier. Fails with `KeyNotFound` if the ring does not.
pub fn derive_storage_key(
    engine: &CryptoEngine,
    owner: &Owner,
    document_id: &DocumentId,
) -> Result<StorageKey, CryptoError> {
    let context = BindingContext::new(document_id, owner);
    let blob = engine.encrypt_deterministic(
        document_id.key_identifier(),
        context,
        clear_value(owner, document_id).as_bytes(),
    )?;
    Ok(StorageKey(blob.to_encoded()))
}

/// Recover and check the clear value behind a storage key.
///
/// Succeeds only with a key ring holding the right key and the same owner and
/// document id; returns the `"{owner}-{document id}"` string.
pub fn reveal_storage_key(
    engine: &CryptoEngine,
    key: &StorageKey,
    owner: &Owner,
    document_id: &DocumentId,
) -> Result<String, CryptoError> {
    let blob = EncryptedBlob::from_encoded(key.as_str())?;
    let clear = engine.decrypt_deterministic(BindingContext::new(document_id, owner), &blob)?;
    String::from_utf8(clear).map_err(|_| CryptoError::MalformedBlob("storage key is not utf-8"))
}
