//! Storage channel abstraction
//!
//! A channel holds the raw bytes of files; everything else about a file lives
//! in the metadata store. Each file names its channel, and the
//! [`ChannelRegistry`] maps that name to a configured adapter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Channel, StorageLocator, DEFAULT_S3_PROFILE};

pub mod factory;
pub mod local;
pub mod memory;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("{0} channel is not configured")]
    NotConfigured(Channel),

    #[error("locator for the {found} channel passed to the {expected} adapter")]
    LocatorMismatch { expected: Channel, found: Channel },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Uniform byte-level interface over every storage backend
#[async_trait]
pub trait StorageChannel: Send + Sync {
    fn channel(&self) -> Channel;

    /// Get a human-readable identifier for this storage backend type
    fn storage_type(&self) -> &'static str;

    /// Whether the locator is derived from the file path. Path-addressed
    /// channels move bytes on rename; the others only update metadata.
    fn path_addressed(&self) -> bool {
        true
    }

    /// Validate access, create directories and the like
    async fn initialize(&self) -> StorageResult<()>;

    async fn get(&self, locator: &StorageLocator) -> StorageResult<Vec<u8>>;

    /// Store bytes for `path`; returns where they ended up
    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<StorageLocator>;

    /// Delete the bytes behind a locator; an already missing object is not an error
    async fn delete(&self, locator: &StorageLocator) -> StorageResult<()>;

    /// Duplicate an object under a new path
    async fn copy(&self, locator: &StorageLocator, new_path: &str) -> StorageResult<StorageLocator> {
        let data = self.get(locator).await?;
        self.put(new_path, &data).await
    }
}

/// Storage configuration for each channel the deployment enables
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Filesystem-backed object bucket
    pub object_store_path: Option<String>,
    pub s3: Vec<crate::models::S3ChannelConfig>,
    pub telegram: Option<crate::models::TelegramChannelConfig>,
}

/// Configured adapters, looked up per file
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    object_store: Option<Arc<dyn StorageChannel>>,
    s3: HashMap<String, Arc<dyn StorageChannel>>,
    messaging: Option<Arc<dyn StorageChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object_store(mut self, channel: Arc<dyn StorageChannel>) -> Self {
        self.object_store = Some(channel);
        self
    }

    pub fn with_s3_profile(mut self, profile: impl Into<String>, channel: Arc<dyn StorageChannel>) -> Self {
        self.s3.insert(profile.into(), channel);
        self
    }

    pub fn with_messaging(mut self, channel: Arc<dyn StorageChannel>) -> Self {
        self.messaging = Some(channel);
        self
    }

    /// Adapter for a file. `Ok(None)` means the channel is not managed here and
    /// the file is metadata-only.
    pub fn resolve(
        &self,
        channel: Channel,
        locator: Option<&StorageLocator>,
    ) -> StorageResult<Option<Arc<dyn StorageChannel>>> {
        let adapter = match channel {
            Channel::Unknown => return Ok(None),
            Channel::ObjectStore => self.object_store.clone(),
            Channel::MessagingBlob => self.messaging.clone(),
            Channel::S3 => {
                let profile = match locator {
                    Some(StorageLocator::S3 { profile, .. }) => profile.as_str(),
                    _ => DEFAULT_S3_PROFILE,
                };
                self.s3.get(profile).cloned()
            }
        };
        adapter.map(Some).ok_or(StorageError::NotConfigured(channel))
    }

    pub fn configured(&self) -> Vec<(Channel, &'static str)> {
        let mut out = Vec::new();
        if let Some(c) = &self.object_store {
            out.push((Channel::ObjectStore, c.storage_type()));
        }
        for c in self.s3.values() {
            out.push((Channel::S3, c.storage_type()));
        }
        if let Some(c) = &self.messaging {
            out.push((Channel::MessagingBlob, c.storage_type()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryChannel;
    use super::*;

    #[test]
    fn test_resolve_by_channel_and_profile() {
        let registry = ChannelRegistry::new()
            .with_object_store(Arc::new(MemoryChannel::object_store()))
            .with_s3_profile("archive", Arc::new(MemoryChannel::s3("archive-bucket", "archive")));

        assert!(registry.resolve(Channel::ObjectStore, None).unwrap().is_some());
        assert!(registry.resolve(Channel::Unknown, None).unwrap().is_none());

        let archive = StorageLocator::S3 {
            bucket: "archive-bucket".into(),
            key: "a.jpg".into(),
            profile: "archive".into(),
        };
        assert!(registry.resolve(Channel::S3, Some(&archive)).unwrap().is_some());

        // no "default" profile configured
        assert!(matches!(
            registry.resolve(Channel::S3, None),
            Err(StorageError::NotConfigured(Channel::S3))
        ));
        assert!(matches!(
            registry.resolve(Channel::MessagingBlob, None),
            Err(StorageError::NotConfigured(Channel::MessagingBlob))
        ));
    }
}
