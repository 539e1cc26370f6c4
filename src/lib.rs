//! # docvault
//!
//! Owner-scoped encrypted document storage.
//!
//! Every document is encrypted under a key derived from the active
//! passphrase, the document id, and the owner. The object it is stored under
//! is named by a deterministic encryption of `owner-documentId`, so the
//! backing store never sees who owns what. Passphrases rotate through a
//! [`KeyRing`]; documents written under a retired key stay readable as long
//! as the ring still holds it.
//!
//! ## Public API
//!
//! [`DocumentVault`] is the entry point. The engine, envelope, and storage
//! key modules are public for callers that need the lower layers directly
//! (tests, migrations, custom back-ends). Raw AEAD and random primitives stay
//! `pub(crate)`.

pub mod audit;
pub mod config;
pub(crate) mod crypto;
pub mod document;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod storage;
pub mod storage_key;
pub mod vault;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

pub use audit::{AuditRecord, AuditSink, FileAuditSink, Operation, Outcome};
pub use config::VaultConfig;
pub use document::{Document, DocumentId, Owner};
pub use engine::{BindingContext, CryptoEngine};
pub use envelope::EncryptedBlob;
pub use error::{ConfigError, CryptoError, KeyRingError, StorageError, VaultError};
pub use keys::{KeyIdentifier, KeyRing, Passphrase};
pub use storage::{FileSystemBucket, InMemoryStorage, ObjectMetadata, Storage};
pub use storage_key::StorageKey;
pub use vault::{DocumentVault, StoreOptions};

/// Generate a fresh random passphrase suitable for a new key identifier.
///
/// 32 bytes from the system CSPRNG, base64url encoded. Production
/// deployments usually get passphrases from a secret manager instead.
pub fn generate_passphrase() -> Result<Passphrase, CryptoError> {
    let mut bytes = zeroize::Zeroizing::new([0u8; crypto::KEY_LEN]);
    crypto::fill_random(bytes.as_mut())?;
    Ok(Passphrase::new(URL_SAFE_NO_PAD.encode(bytes.as_ref())))
}
