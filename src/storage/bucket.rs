//! Directory-backed blob bucket.
//!
//! Each object is two files in the bucket directory, named by the SHA-256 of
//! its storage key:
//!
//! ```text
//! {sha256(key)}        encrypted blob bytes
//! {sha256(key)}.meta   ObjectMetadata as JSON
//! ```
//!
//! Storage keys grow with the owner string; hashed names stay at 64
//! characters whatever the key length. Both files are written to a
//! `.partial` file and renamed into place. Metadata is written before the
//! blob, so an object is never visible without its hold.
//!
//! Operations on one bucket handle are serialized, so a delete and a hold
//! change never interleave. Several processes sharing a directory are not
//! coordinated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ObjectMetadata, Storage};
use crate::crypto;
use crate::error::StorageError;
use crate::storage_key::StorageKey;

const META_SUFFIX: &str = ".meta";
const PARTIAL_SUFFIX: &str = ".partial";

/// A bucket backed by a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct FileSystemBucket {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileSystemBucket {
    /// Open an existing bucket directory. Fails with `BucketNotFound` if it
    /// does not exist; buckets are provisioned, never created on the fly.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let bucket = Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
        };
        bucket.ensure_exists().await?;
        info!(bucket = %bucket.root.display(), "bucket found");
        Ok(bucket)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_exists(&self) -> Result<(), StorageError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::BucketNotFound(self.root.display().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(self.root.display().to_string()))
            }
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    fn object_path(&self, key: &StorageKey) -> Result<PathBuf, StorageError> {
        let name = key.as_str();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StorageError::InvalidKey);
        }
        Ok(self.root.join(crypto::sha256_hex(name.as_bytes())))
    }

    fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
        let mut os = path.as_os_str().to_owned();
        os.push(suffix);
        PathBuf::from(os)
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let partial = Self::with_suffix(path, PARTIAL_SUFFIX);
        let written = match fs::write(&partial, bytes).await {
            Ok(()) => fs::rename(&partial, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            Self::remove_if_present(&partial).await?;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_metadata(path: &Path) -> Result<Option<ObjectMetadata>, StorageError> {
        match fs::read(Self::with_suffix(path, META_SUFFIX)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_metadata(path: &Path, metadata: &ObjectMetadata) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(metadata)?;
        Self::write_atomic(&Self::with_suffix(path, META_SUFFIX), &bytes).await
    }

    async fn remove_if_present(path: &Path) -> Result<bool, StorageError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_object(path: &Path) -> Result<bool, StorageError> {
        let existed = Self::remove_if_present(path).await?;
        Self::remove_if_present(&Self::with_suffix(path, META_SUFFIX)).await?;
        Ok(existed)
    }

    /// Metadata of a live object. Expired objects are removed and reported
    /// as absent.
    async fn live_metadata(path: &Path) -> Result<Option<ObjectMetadata>, StorageError> {
        if !fs::try_exists(path).await? {
            return Ok(None);
        }
        let metadata = Self::read_metadata(path).await?.unwrap_or_default();
        if metadata.is_expired(Utc::now()) {
            debug!(object = %path.display(), "removing expired object");
            Self::remove_object(path).await?;
            return Ok(None);
        }
        Ok(Some(metadata))
    }
}

#[async_trait]
impl Storage for FileSystemBucket {
    async fn get(&self, key: &StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().await;
        if Self::live_metadata(&path).await?.is_none() {
            return Ok(None);
        }
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "read object");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        key: &StorageKey,
        value: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().await;
        let replacing = matches!(fs::metadata(&path).await, Ok(m) if m.is_file());

        Self::write_metadata(&path, &metadata).await?;
        if let Err(e) = Self::write_atomic(&path, &value).await {
            if !replacing {
                warn!(object = %path.display(), error = %e, "blob write failed, removing metadata");
                Self::remove_if_present(&Self::with_suffix(&path, META_SUFFIX)).await?;
            }
            return Err(e);
        }

        debug!(bytes = value.len(), hold = metadata.hold, "wrote object");
        Ok(())
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().await;
        match Self::live_metadata(&path).await? {
            None => Ok(false),
            Some(metadata) if metadata.hold => Err(StorageError::RetentionHold),
            Some(_) => Self::remove_object(&path).await,
        }
    }

    async fn set_hold(&self, key: &StorageKey, hold: bool) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().await;
        match Self::live_metadata(&path).await? {
            None => Ok(false),
            Some(mut metadata) => {
                metadata.hold = hold;
                Self::write_metadata(&path, &metadata).await?;
                Ok(true)
            }
        }
    }

    async fn has_hold(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        let _guard = self.lock.lock().await;
        Ok(Self::live_metadata(&path).await?.is_some_and(|m| m.hold))
    }

    async fn ready(&self) -> Result<(), StorageError> {
        self.ensure_exists().await
    }
}
