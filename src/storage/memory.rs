//! In-process storage back-end.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{ObjectMetadata, Storage};
use crate::error::StorageError;
use crate::storage_key::StorageKey;

struct Entry {
    value: Vec<u8>,
    metadata: ObjectMetadata,
}

/// A `HashMap`-backed store. Used by tests and single-process deployments
/// that do not need durability.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<StorageKey, Entry>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.objects
            .lock()
            .values()
            .filter(|e| !e.metadata.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all live objects, as the back-end sees them.
    pub fn object_names(&self) -> Vec<String> {
        let now = Utc::now();
        self.objects
            .lock()
            .iter()
            .filter(|(_, e)| !e.metadata.is_expired(now))
            .map(|(k, _)| k.as_str().to_string())
            .collect()
    }
}

/// Look up a live entry, dropping it first if it has expired.
fn live<'a>(objects: &'a mut HashMap<StorageKey, Entry>, key: &StorageKey) -> Option<&'a mut Entry> {
    let expired = objects
        .get(key)
        .is_some_and(|e| e.metadata.is_expired(Utc::now()));
    if expired {
        objects.remove(key);
        return None;
    }
    objects.get_mut(key)
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        let mut objects = self.objects.lock();
        Ok(live(&mut objects, key).map(|e| e.value.clone()))
    }

    async fn put(
        &self,
        key: &StorageKey,
        value: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        self.objects
            .lock()
            .insert(key.clone(), Entry { value, metadata });
        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let mut objects = self.objects.lock();
        let held = match live(&mut objects, key) {
            None => return Ok(false),
            Some(entry) => entry.metadata.hold,
        };
        if held {
            return Err(StorageError::RetentionHold);
        }
        Ok(objects.remove(key).is_some())
    }

    async fn set_hold(&self, key: &StorageKey, hold: bool) -> Result<bool, StorageError> {
        let mut objects = self.objects.lock();
        match live(&mut objects, key) {
            None => Ok(false),
            Some(entry) => {
                entry.metadata.hold = hold;
                Ok(true)
            }
        }
    }

    async fn has_hold(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let mut objects = self.objects.lock();
        Ok(live(&mut objects, key).is_some_and(|e| e.metadata.hold))
    }

    async fn ready(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn key(name: &str) -> StorageKey {
        StorageKey::from_raw(name)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = InMemoryStorage::new();
        storage
            .put(&key("a"), b"value".to_vec(), ObjectMetadata::default())
            .await
            .unwrap();

        assert_eq!(storage.get(&key("a")).await.unwrap().unwrap(), b"value");
        assert!(storage.delete(&key("a")).await.unwrap());
        assert!(!storage.delete(&key("a")).await.unwrap());
        assert!(storage.get(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hold_blocks_delete() {
        let storage = InMemoryStorage::new();
        storage
            .put(&key("a"), b"value".to_vec(), ObjectMetadata::with_hold(true))
            .await
            .unwrap();

        assert!(storage.has_hold(&key("a")).await.unwrap());
        assert!(matches!(
            storage.delete(&key("a")).await,
            Err(StorageError::RetentionHold)
        ));
        assert!(storage.get(&key("a")).await.unwrap().is_some());

        assert!(storage.set_hold(&key("a"), false).await.unwrap());
        assert!(storage.delete(&key("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_absent_objects() {
        let storage = InMemoryStorage::new();
        assert!(!storage.set_hold(&key("missing"), true).await.unwrap());
        assert!(!storage.has_hold(&key("missing")).await.unwrap());
        assert!(!storage.delete(&key("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_objects_are_absent_unless_held() {
        let storage = InMemoryStorage::new();
        let past = Some(Utc::now() - Duration::seconds(5));

        storage
            .put(&key("gone"), b"x".to_vec(), ObjectMetadata { hold: false, expires_at: past })
            .await
            .unwrap();
        storage
            .put(&key("kept"), b"y".to_vec(), ObjectMetadata { hold: true, expires_at: past })
            .await
            .unwrap();

        assert!(storage.get(&key("gone")).await.unwrap().is_none());
        assert!(!storage.delete(&key("gone")).await.unwrap());
        assert!(storage.get(&key("kept")).await.unwrap().is_some());
        assert_eq!(storage.len(), 1);
    }
}
