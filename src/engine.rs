//! The cryptography engine.
//!
//! Performs authenticated encryption of payloads bound to a
//! (document id, owner) context, using the key ring for key selection:
//!
//! - `encrypt` always uses the ring's active key and tags the blob with its
//!   identifier.
//! - `decrypt` reads the identifier from the blob and looks it up; it never
//!   assumes the active key.
//!
//! Supplying a different owner or document id at decrypt time derives a
//! different key, so the GCM check fails. It never yields wrong plaintext.
//!
//! The engine holds no mutable state and is safe to share across threads.

use tracing::trace;

use crate::crypto;
use crate::document::{DocumentId, Owner, DOCUMENT_ID_RANDOM_LEN};
use crate::envelope::EncryptedBlob;
use crate::error::CryptoError;
use crate::keys::{self, KeyIdentifier, KeyRing, Purpose};

/// The metadata a ciphertext is bound to.
#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    pub document_id: &'a DocumentId,
    pub owner: &'a Owner,
}

impl<'a> BindingContext<'a> {
    pub fn new(document_id: &'a DocumentId, owner: &'a Owner) -> Self {
        Self { document_id, owner }
    }
}

/// Authenticated encryption over a [`KeyRing`].
#[derive(Debug)]
pub struct CryptoEngine {
    keyring: KeyRing,
}

impl CryptoEngine {
    pub fn new(keyring: KeyRing) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &KeyRing {
        &self.keyring
    }

    /// Generate a fresh, unpredictable document id (128 random bits) tagged
    /// with the active key identifier.
    pub fn new_document_id(&self) -> Result<DocumentId, CryptoError> {
        let mut random = [0u8; DOCUMENT_ID_RANDOM_LEN];
        crypto::fill_random(&mut random)?;
        Ok(DocumentId::generate(self.keyring.active_identifier(), &random))
    }

    /// Encrypt `plaintext` under the active key with a fresh random nonce.
    pub fn encrypt(
        &self,
        context: BindingContext<'_>,
        plaintext: &[u8],
    ) -> Result<EncryptedBlob, CryptoError> {
        let nonce = crypto::random_nonce()?;
        self.seal(
            self.keyring.active_identifier(),
            Purpose::Document,
            context,
            nonce,
            plaintext,
        )
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with `KeyNotFound` if the blob's key identifier has been retired
    /// from the ring, and with `AuthenticationFailed` on tampering or a
    /// context mismatch.
    pub fn decrypt(
        &self,
        context: BindingContext<'_>,
        blob: &EncryptedBlob,
    ) -> Result<Vec<u8>, CryptoError> {
        self.open(Purpose::Document, context, blob)
    }

    /// Repeatable encryption for storage keys: the nonce is derived from the
    /// context, so the same inputs under the same key give the same blob.
    pub(crate) fn encrypt_deterministic(
        &self,
        key_identifier: KeyIdentifier,
        context: BindingContext<'_>,
        plaintext: &[u8],
    ) -> Result<EncryptedBlob, CryptoError> {
        let root = self.keyring.lookup(key_identifier)?;
        let nonce = keys::derive_nonce(root, context.document_id.as_str(), context.owner.as_str())?;
        self.seal(key_identifier, Purpose::StorageKey, context, nonce, plaintext)
    }

    pub(crate) fn decrypt_deterministic(
        &self,
        context: BindingContext<'_>,
        blob: &EncryptedBlob,
    ) -> Result<Vec<u8>, CryptoError> {
        self.open(Purpose::StorageKey, context, blob)
    }

    fn seal(
        &self,
        key_identifier: KeyIdentifier,
        purpose: Purpose,
        context: BindingContext<'_>,
        nonce: [u8; crypto::NONCE_LEN],
        plaintext: &[u8],
    ) -> Result<EncryptedBlob, CryptoError> {
        let root = self.keyring.lookup(key_identifier)?;
        let key = keys::derive_key(
            root,
            purpose,
            context.document_id.as_str(),
            context.owner.as_str(),
        )?;

        let header = EncryptedBlob::header(key_identifier);
        let (ciphertext, tag) = crypto::seal(key.as_bytes(), nonce, &header, plaintext)?;
        trace!(key = %key_identifier, ?purpose, "sealed payload");

        Ok(EncryptedBlob {
            key_identifier,
            nonce,
            ciphertext,
            tag,
        })
    }

    fn open(
        &self,
        purpose: Purpose,
        context: BindingContext<'_>,
        blob: &EncryptedBlob,
    ) -> Result<Vec<u8>, CryptoError> {
        let root = self.keyring.lookup(blob.key_identifier)?;
        let key = keys::derive_key(
            root,
            purpose,
            context.document_id.as_str(),
            context.owner.as_str(),
        )?;

        let header = EncryptedBlob::header(blob.key_identifier);
        crypto::open(key.as_bytes(), blob.nonce, &header, &blob.ciphertext, &blob.tag)
    }
}
