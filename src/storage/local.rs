//! Filesystem-backed object bucket
//!
//! Objects live at `<root>/<file path>`, so the locator key is the file path
//! itself and a rename has to move the bytes.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

use super::{StorageChannel, StorageError, StorageResult};
use crate::models::{Channel, StorageLocator};

pub struct LocalBucketChannel {
    root: PathBuf,
}

impl LocalBucketChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object key to a path under the root, rejecting keys that would escape it
    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn bucket_key(locator: &StorageLocator) -> StorageResult<&str> {
        match locator {
            StorageLocator::Bucket { key } => Ok(key),
            other => Err(StorageError::LocatorMismatch {
                expected: Channel::ObjectStore,
                found: other.channel(),
            }),
        }
    }
}

#[async_trait]
impl StorageChannel for LocalBucketChannel {
    fn channel(&self) -> Channel {
        Channel::ObjectStore
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }

    async fn initialize(&self) -> StorageResult<()> {
        if let Err(e) = fs::create_dir_all(&self.root).await {
            error!("Failed to create object store directory {:?}: {}", self.root, e);
            return Err(e.into());
        }
        info!("Local object bucket initialized at {:?}", self.root);
        Ok(())
    }

    async fn get(&self, locator: &StorageLocator) -> StorageResult<Vec<u8>> {
        let key = Self::bucket_key(locator)?;
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<StorageLocator> {
        let target = self.object_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, data).await?;
        debug!("Stored object locally: {}", target.display());
        Ok(StorageLocator::Bucket {
            key: path.to_string(),
        })
    }

    async fn delete(&self, locator: &StorageLocator) -> StorageResult<()> {
        let key = Self::bucket_key(locator)?;
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted file: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("File already deleted: {}", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, locator: &StorageLocator, new_path: &str) -> StorageResult<StorageLocator> {
        let key = Self::bucket_key(locator)?;
        let source = self.object_path(key)?;
        let target = self.object_path(new_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::copy(&source, &target).await {
            Ok(_) => Ok(StorageLocator::Bucket {
                key: new_path.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
