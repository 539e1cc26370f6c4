//! The document vault service.
//!
//! Orchestrates the engine, the storage key deriver and a storage back-end:
//!
//! ```text
//! store:    new id -> storage key -> serialize -> encrypt -> put (+ hold)
//! retrieve: storage key -> get -> decrypt -> deserialize
//! ```
//!
//! Lifecycle of a stored object:
//!
//! ```text
//! Absent -> Stored(hold=false) <-> Stored(hold=true)
//!                  |
//!                  v
//!                Absent
//! ```
//!
//! Deletion is only possible from `hold=false`. This is the only layer that
//! translates engine and storage failures into [`VaultError`], and it reports
//! every operation to the audit log.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace, warn};
use zeroize::Zeroizing;

use crate::audit::{AuditLog, AuditRecord, AuditSink, Operation, Outcome};
use crate::config::{env_lookup, VaultConfig};
use crate::document::{Document, DocumentId, Owner};
use crate::engine::{BindingContext, CryptoEngine};
use crate::envelope::EncryptedBlob;
use crate::error::{CryptoError, StorageError, VaultError};
use crate::keys::KeyIdentifier;
use crate::storage::{FileSystemBucket, ObjectMetadata, Storage};
use crate::storage_key::{derive_storage_key, StorageKey};

/// Options for [`DocumentVault::store_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Place a retention hold in the same write as the object.
    pub hold: bool,
    /// Let the back-end drop the object after this instant (ignored while
    /// held).
    pub expires_at: Option<DateTime<Utc>>,
}

enum Retrieved {
    Found(Document),
    Absent,
    Denied,
}

/// Owner-scoped encrypted document storage.
///
/// Holds no mutable state besides what lives in the back-end; share it
/// behind an `Arc` and call it from as many tasks as needed.
pub struct DocumentVault<S> {
    engine: CryptoEngine,
    storage: S,
    audit: AuditLog,
    storage_deadline: Option<Duration>,
}

impl<S> std::fmt::Debug for DocumentVault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentVault")
            .field("engine", &self.engine)
            .field("audit", &self.audit)
            .field("storage_deadline", &self.storage_deadline)
            .finish()
    }
}

impl DocumentVault<FileSystemBucket> {
    /// Build a vault from configuration. Passphrases are resolved through
    /// `lookup` (normally the process environment). Fails fast on any
    /// configuration problem or a missing bucket.
    pub async fn from_config<F>(config: &VaultConfig, lookup: F) -> Result<Self, VaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keyring = config.crypto.key_ring(lookup)?;
        info!(
            active = %keyring.active_identifier(),
            decryption = ?keyring.identifiers(),
            "key ring loaded"
        );

        let bucket = FileSystemBucket::open(&config.storage.bucket_path).await?;
        let mut vault = Self::new(CryptoEngine::new(keyring), bucket);
        if let Some(deadline) = config.storage.deadline() {
            vault = vault.with_storage_deadline(deadline);
        }
        Ok(vault)
    }

    /// [`from_config`](Self::from_config) with settings and passphrases
    /// taken from the process environment.
    pub async fn from_env() -> Result<Self, VaultError> {
        let config = VaultConfig::from_env()?;
        Self::from_config(&config, env_lookup).await
    }
}

impl<S: Storage> DocumentVault<S> {
    pub fn new(engine: CryptoEngine, storage: S) -> Self {
        Self {
            engine,
            storage,
            audit: AuditLog::new(),
            storage_deadline: None,
        }
    }

    /// Run every storage call under `deadline`. An elapsed deadline is
    /// reported as `StorageUnavailable`; nothing is retried.
    pub fn with_storage_deadline(mut self, deadline: Duration) -> Self {
        self.storage_deadline = Some(deadline);
        self
    }

    pub fn add_audit_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.audit.add_sink(sink);
    }

    pub fn engine(&self) -> &CryptoEngine {
        &self.engine
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The object name a document lives under.
    pub fn storage_key(&self, id: &DocumentId, owner: &Owner) -> Result<StorageKey, VaultError> {
        trace!("deriving storage key");
        Ok(derive_storage_key(&self.engine, owner, id)?)
    }

    async fn within_deadline<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match self.storage_deadline {
            None => call.await,
            Some(deadline) => tokio::time::timeout(deadline, call)
                .await
                .map_err(|_| StorageError::Unavailable("deadline exceeded".to_string()))?,
        }
    }

    fn report<T>(
        &self,
        operation: Operation,
        result: &Result<T, VaultError>,
        key_identifier: Option<KeyIdentifier>,
        on_ok: impl FnOnce(&T) -> Outcome,
    ) {
        let outcome = match result {
            Ok(value) => on_ok(value),
            Err(e) => Outcome::from(e),
        };
        self.audit
            .append(AuditRecord::new(operation, outcome, key_identifier));
    }

    // -----------------------------------------------------------------------
    // Store
    // -----------------------------------------------------------------------

    /// Encrypt and store `document` for `owner`, optionally under a
    /// retention hold. Creates exactly one object.
    pub async fn store(
        &self,
        owner: &Owner,
        document: &Document,
        hold: bool,
    ) -> Result<DocumentId, VaultError> {
        self.store_with(
            owner,
            document,
            StoreOptions {
                hold,
                expires_at: None,
            },
        )
        .await
    }

    pub async fn store_with(
        &self,
        owner: &Owner,
        document: &Document,
        options: StoreOptions,
    ) -> Result<DocumentId, VaultError> {
        let result = self.store_inner(owner, document, options).await;
        let key_identifier = result.as_ref().ok().map(DocumentId::key_identifier);
        self.report(Operation::Store, &result, key_identifier, |_| Outcome::Ok);
        result
    }

    async fn store_inner(
        &self,
        owner: &Owner,
        document: &Document,
        options: StoreOptions,
    ) -> Result<DocumentId, VaultError> {
        let id = self.engine.new_document_id()?;
        trace!(key = %id.key_identifier(), "generated document id, encrypting");

        let key = self.storage_key(&id, owner)?;
        let plaintext = Zeroizing::new(document.serialize()?);
        let blob = self
            .engine
            .encrypt(BindingContext::new(&id, owner), &plaintext)?;

        let metadata = ObjectMetadata {
            hold: options.hold,
            expires_at: options.expires_at,
        };
        self.within_deadline(self.storage.put(&key, blob.to_bytes(), metadata))
            .await?;

        debug!(storage_key = %key, hold = options.hold, "document stored");
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Retrieve
    // -----------------------------------------------------------------------

    /// Fetch and decrypt a document.
    ///
    /// `Ok(None)` if there is no such document for this owner. A wrong owner,
    /// a tampered object, or a corrupt blob all yield `Ok(None)` as well.
    /// `KeyNotFound` means the document exists under a retired key.
    pub async fn retrieve(
        &self,
        id: &DocumentId,
        owner: &Owner,
    ) -> Result<Option<Document>, VaultError> {
        let result = self.retrieve_inner(id, owner).await;
        self.report(
            Operation::Retrieve,
            &result,
            Some(id.key_identifier()),
            |r| match r {
                Retrieved::Found(_) => Outcome::Ok,
                Retrieved::Absent => Outcome::NotFound,
                Retrieved::Denied => Outcome::Denied,
            },
        );
        result.map(|r| match r {
            Retrieved::Found(document) => Some(document),
            Retrieved::Absent | Retrieved::Denied => None,
        })
    }

    async fn retrieve_inner(&self, id: &DocumentId, owner: &Owner) -> Result<Retrieved, VaultError> {
        let key = self.storage_key(id, owner)?;
        let Some(bytes) = self.within_deadline(self.storage.get(&key)).await? else {
            trace!("no object under storage key");
            return Ok(Retrieved::Absent);
        };

        trace!("found document, decrypting");
        let blob = match EncryptedBlob::from_bytes(&bytes) {
            Ok(blob) => blob,
            Err(e) => {
                error!(storage_key = %key, error = %e, "stored object is not a valid blob");
                return Ok(Retrieved::Denied);
            }
        };

        let plaintext = match self.engine.decrypt(BindingContext::new(id, owner), &blob) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(CryptoError::AuthenticationFailed) => {
                error!(storage_key = %key, "document failed authentication");
                return Ok(Retrieved::Denied);
            }
            Err(e) => return Err(e.into()),
        };

        trace!("decrypted, deserializing");
        Ok(Retrieved::Found(Document::deserialize(&plaintext)?))
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete a document. `Ok(false)` if there was nothing to delete.
    /// Fails with `HoldViolation` while the retention hold is set; clear it
    /// first, or use [`purge`](Self::purge).
    pub async fn delete(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let result = self.delete_inner(id, owner).await;
        self.report(Operation::Delete, &result, Some(id.key_identifier()), found);
        result
    }

    async fn delete_inner(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let key = self.storage_key(id, owner)?;
        match self.within_deadline(self.storage.delete(&key)).await {
            Ok(true) => {
                debug!(storage_key = %key, "document deleted");
                Ok(true)
            }
            Ok(false) => {
                warn!("found no document to delete");
                Ok(false)
            }
            Err(StorageError::RetentionHold) => {
                warn!(storage_key = %key, "refusing to delete document under retention hold");
                Err(VaultError::HoldViolation)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear any retention hold, then delete. The explicit path for callers
    /// that have decided a hold is over.
    pub async fn purge(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let result = self.purge_inner(id, owner).await;
        self.report(Operation::Purge, &result, Some(id.key_identifier()), found);
        result
    }

    async fn purge_inner(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let key = self.storage_key(id, owner)?;
        if !self.within_deadline(self.storage.set_hold(&key, false)).await? {
            return Ok(false);
        }
        info!(storage_key = %key, "retention hold cleared for purge");
        Ok(self.within_deadline(self.storage.delete(&key)).await?)
    }

    // -----------------------------------------------------------------------
    // Retention hold
    // -----------------------------------------------------------------------

    /// Place a retention hold. Idempotent; `Ok(false)` if the document does
    /// not exist.
    pub async fn set_hold(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let result = self.change_hold(id, owner, true).await;
        self.report(Operation::SetHold, &result, Some(id.key_identifier()), found);
        result
    }

    /// Remove a retention hold. Idempotent; `Ok(false)` if the document does
    /// not exist.
    pub async fn clear_hold(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let result = self.change_hold(id, owner, false).await;
        self.report(Operation::ClearHold, &result, Some(id.key_identifier()), found);
        result
    }

    async fn change_hold(&self, id: &DocumentId, owner: &Owner, hold: bool) -> Result<bool, VaultError> {
        let key = self.storage_key(id, owner)?;
        let changed = self
            .within_deadline(self.storage.set_hold(&key, hold))
            .await?;
        if changed {
            info!(storage_key = %key, hold, "retention hold updated");
        }
        Ok(changed)
    }

    /// Whether the document exists and is under retention hold.
    pub async fn has_hold(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let result = self.has_hold_inner(id, owner).await;
        self.report(Operation::HasHold, &result, Some(id.key_identifier()), found);
        result
    }

    async fn has_hold_inner(&self, id: &DocumentId, owner: &Owner) -> Result<bool, VaultError> {
        let key = self.storage_key(id, owner)?;
        Ok(self.within_deadline(self.storage.has_hold(&key)).await?)
    }

    /// Health check: is the storage back-end reachable?
    pub async fn ready(&self) -> Result<(), VaultError> {
        Ok(self.within_deadline(self.storage.ready()).await?)
    }
}

fn found(existed: &bool) -> Outcome {
    if *existed {
        Outcome::Ok
    } else {
        Outcome::NotFound
    }
}

impl From<&VaultError> for Outcome {
    fn from(err: &VaultError) -> Self {
        match err {
            VaultError::KeyNotFound(_) => Outcome::KeyNotFound,
            VaultError::HoldViolation => Outcome::HoldViolation,
            VaultError::StorageUnavailable(_) => Outcome::StorageUnavailable,
            _ => Outcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::keys::KeyRing;
    use crate::storage::InMemoryStorage;

    fn vault() -> DocumentVault<InMemoryStorage> {
        let ring = KeyRing::single(KeyIdentifier::new(1).unwrap(), "passord").unwrap();
        DocumentVault::new(CryptoEngine::new(ring), InMemoryStorage::new())
    }

    fn document() -> Document {
        Document::new("Tittel1", "application/pdf", vec![1u8, 2, 3, 4])
    }

    /// Never answers.
    struct StalledStorage;

    #[async_trait]
    impl Storage for StalledStorage {
        async fn get(&self, _: &StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
            std::future::pending().await
        }
        async fn put(&self, _: &StorageKey, _: Vec<u8>, _: ObjectMetadata) -> Result<(), StorageError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &StorageKey) -> Result<bool, StorageError> {
            std::future::pending().await
        }
        async fn set_hold(&self, _: &StorageKey, _: bool) -> Result<bool, StorageError> {
            std::future::pending().await
        }
        async fn has_hold(&self, _: &StorageKey) -> Result<bool, StorageError> {
            std::future::pending().await
        }
        async fn ready(&self) -> Result<(), StorageError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_store_creates_exactly_one_object() {
        let vault = vault();
        let owner = Owner::new("12345");

        let id = vault.store(&owner, &document(), false).await.unwrap();
        assert_eq!(vault.storage().len(), 1);
        assert_eq!(vault.retrieve(&id, &owner).await.unwrap(), Some(document()));
    }

    #[tokio::test]
    async fn test_store_with_hold_is_atomic() {
        let vault = vault();
        let owner = Owner::new("12345");

        let id = vault.store(&owner, &document(), true).await.unwrap();
        assert!(vault.has_hold(&id, &owner).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_removes_held_document() {
        let vault = vault();
        let owner = Owner::new("12345");
        let id = vault.store(&owner, &document(), true).await.unwrap();

        assert!(matches!(vault.delete(&id, &owner).await, Err(VaultError::HoldViolation)));
        assert!(vault.purge(&id, &owner).await.unwrap());
        assert!(vault.retrieve(&id, &owner).await.unwrap().is_none());
        assert!(!vault.purge(&id, &owner).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_document_is_gone() {
        let vault = vault();
        let owner = Owner::new("12345");
        let options = StoreOptions {
            hold: false,
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
        };

        let id = vault.store_with(&owner, &document(), options).await.unwrap();
        assert!(vault.retrieve(&id, &owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_deadline_maps_to_unavailable() {
        let ring = KeyRing::single(KeyIdentifier::new(1).unwrap(), "passord").unwrap();
        let vault = DocumentVault::new(CryptoEngine::new(ring), Arc::new(StalledStorage))
            .with_storage_deadline(Duration::from_millis(20));
        let owner = Owner::new("12345");

        assert!(matches!(
            vault.store(&owner, &document(), false).await,
            Err(VaultError::StorageUnavailable(_))
        ));
        assert!(matches!(vault.ready().await, Err(VaultError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_corrupt_object_reads_as_absent() {
        let vault = vault();
        let owner = Owner::new("12345");
        let id = vault.store(&owner, &document(), false).await.unwrap();
        let key = vault.storage_key(&id, &owner).unwrap();

        vault
            .storage()
            .put(&key, b"garbage".to_vec(), ObjectMetadata::default())
            .await
            .unwrap();
        assert!(vault.retrieve(&id, &owner).await.unwrap().is_none());
    }
}
