//! Pluggable blob storage with retention holds.
//!
//! Values handed to a back-end are already-encrypted blobs under opaque
//! storage keys. Back-ends never see plaintext, owners, or document ids.
//!
//! Contract shared by every implementation:
//! - `delete` refuses held objects with [`StorageError::RetentionHold`] and
//!   returns `Ok(false)` for absent ones.
//! - `set_hold` and `has_hold` return `Ok(false)` for absent objects.
//! - An object past its `expires_at` that is not held behaves as absent.
//! - No retries. Transient failures surface as errors for the caller to
//!   retry.

mod bucket;
mod memory;

pub use bucket::FileSystemBucket;
pub use memory::InMemoryStorage;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_key::StorageKey;

/// Operational metadata kept beside each object. Not encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Retention hold. While set, the object cannot be deleted.
    pub hold: bool,
    /// After this instant the object is treated as gone, unless held.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ObjectMetadata {
    pub fn with_hold(hold: bool) -> Self {
        Self {
            hold,
            expires_at: None,
        }
    }

    /// Held objects never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.hold && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A key/value blob store with a per-object retention hold.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read an object. `Ok(None)` if absent.
    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write an object together with its metadata, replacing any previous
    /// object under the same key.
    async fn put(
        &self,
        key: &StorageKey,
        value: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError>;

    /// Delete an object. `Ok(true)` if one existed.
    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Set or clear the retention hold. `Ok(false)` if the object is absent.
    async fn set_hold(&self, key: &StorageKey, hold: bool) -> Result<bool, StorageError>;

    /// Whether the object exists and is held.
    async fn has_hold(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Liveness probe for health checks.
    async fn ready(&self) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for Arc<S> {
    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &StorageKey,
        value: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        (**self).put(key, value, metadata).await
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        (**self).delete(key).await
    }

    async fn set_hold(&self, key: &StorageKey, hold: bool) -> Result<bool, StorageError> {
        (**self).set_hold(key, hold).await
    }

    async fn has_hold(&self, key: &StorageKey) -> Result<bool, StorageError> {
        (**self).has_hold(key).await
    }

    async fn ready(&self) -> Result<(), StorageError> {
        (**self).ready().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_expiry_rules() {
        let now = Utc::now();
        let past = Some(now - Duration::seconds(1));
        let future = Some(now + Duration::hours(1));

        assert!(!ObjectMetadata::default().is_expired(now));
        assert!(ObjectMetadata { hold: false, expires_at: past }.is_expired(now));
        assert!(!ObjectMetadata { hold: false, expires_at: future }.is_expired(now));
        assert!(!ObjectMetadata { hold: true, expires_at: past }.is_expired(now));
    }
}
