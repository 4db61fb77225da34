//! In-memory channel that can stand in for any backend in tests and the
//! `memory` deployment mode

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{StorageChannel, StorageError, StorageResult};
use crate::models::{Channel, StorageLocator};

pub struct MemoryChannel {
    channel: Channel,
    bucket: String,
    profile: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryChannel {
    fn with(channel: Channel, bucket: &str, profile: &str) -> Self {
        Self {
            channel,
            bucket: bucket.to_string(),
            profile: profile.to_string(),
            objects: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    pub fn object_store() -> Self {
        Self::with(Channel::ObjectStore, "", "")
    }

    pub fn s3(bucket: &str, profile: &str) -> Self {
        Self::with(Channel::S3, bucket, profile)
    }

    pub fn messaging() -> Self {
        Self::with(Channel::MessagingBlob, "memory-chat", "")
    }

    /// Make every operation touching `path` fail with a backend error
    pub async fn fail_on(&self, path: &str) {
        self.failing.write().await.insert(path.to_string());
    }

    pub async fn contains(&self, locator: &StorageLocator) -> bool {
        match self.key_of(locator) {
            Ok(key) => self.objects.read().await.contains_key(&key),
            Err(_) => false,
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    fn key_of(&self, locator: &StorageLocator) -> StorageResult<String> {
        match (self.channel, locator) {
            (Channel::ObjectStore, StorageLocator::Bucket { key }) => Ok(key.clone()),
            (Channel::S3, StorageLocator::S3 { key, .. }) => Ok(key.clone()),
            (Channel::MessagingBlob, StorageLocator::Messaging { file_id, .. }) => Ok(file_id.clone()),
            (expected, other) => Err(StorageError::LocatorMismatch {
                expected,
                found: other.channel(),
            }),
        }
    }

    async fn check_failure(&self, path: &str) -> StorageResult<()> {
        if self.failing.read().await.contains(path) {
            return Err(StorageError::Backend(anyhow!("injected failure for {}", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageChannel for MemoryChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }

    fn path_addressed(&self) -> bool {
        self.channel != Channel::MessagingBlob
    }

    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn get(&self, locator: &StorageLocator) -> StorageResult<Vec<u8>> {
        let key = self.key_of(locator)?;
        self.check_failure(&key).await?;
        self.objects
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound(key))
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<StorageLocator> {
        self.check_failure(path).await?;
        let locator = match self.channel {
            Channel::S3 => StorageLocator::S3 {
                bucket: self.bucket.clone(),
                key: path.to_string(),
                profile: self.profile.clone(),
            },
            Channel::MessagingBlob => StorageLocator::Messaging {
                chat_id: self.bucket.clone(),
                file_id: uuid::Uuid::new_v4().simple().to_string(),
                message_id: None,
            },
            _ => StorageLocator::Bucket {
                key: path.to_string(),
            },
        };
        let key = self.key_of(&locator)?;
        self.objects.write().await.insert(key, data.to_vec());
        Ok(locator)
    }

    async fn delete(&self, locator: &StorageLocator) -> StorageResult<()> {
        let key = self.key_of(locator)?;
        self.check_failure(&key).await?;
        self.objects.write().await.remove(&key);
        Ok(())
    }
}
