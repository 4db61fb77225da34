//! Factory for building the channel registry from configuration

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::local::LocalBucketChannel;
use super::{ChannelRegistry, StorageChannel, StorageConfig};
use crate::services::telegram_service::TelegramService;

#[cfg(feature = "s3")]
use crate::services::s3_service::S3Service;

/// Create and initialize every configured channel
pub async fn create_channel_registry(config: StorageConfig) -> Result<ChannelRegistry> {
    let mut registry = ChannelRegistry::new();

    if let Some(path) = config.object_store_path {
        let backend = LocalBucketChannel::new(path);
        backend.initialize().await?;
        registry = registry.with_object_store(Arc::new(backend));
    }

    for s3_config in config.s3 {
        #[cfg(feature = "s3")]
        {
            let profile = s3_config.profile.clone();
            let backend = S3Service::new(s3_config).await?;
            backend.initialize().await?;
            registry = registry.with_s3_profile(profile, Arc::new(backend));
        }
        #[cfg(not(feature = "s3"))]
        {
            warn!(
                "S3 channel '{}' requested but S3 feature not compiled in; S3 files will be unavailable",
                s3_config.profile
            );
        }
    }

    if let Some(telegram_config) = config.telegram {
        let backend = TelegramService::new(telegram_config)?;
        backend.initialize().await?;
        registry = registry.with_messaging(Arc::new(backend));
    }

    let configured = registry.configured();
    if configured.is_empty() {
        warn!("No storage channel configured; every file is treated as metadata-only");
    }
    for (channel, storage_type) in configured {
        info!("Storage channel enabled: {} ({})", channel, storage_type);
    }
    Ok(registry)
}

/// Derive the storage configuration from the application configuration
pub fn storage_config_from_env(config: &crate::config::Config) -> StorageConfig {
    StorageConfig {
        object_store_path: config.object_store_path.clone(),
        s3: config.s3_config.iter().cloned().collect(),
        telegram: config.telegram_config.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_only_registry() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            object_store_path: Some(dir.path().join("bucket").display().to_string()),
            ..Default::default()
        };

        let registry = create_channel_registry(config).await.unwrap();
        assert!(registry.resolve(Channel::ObjectStore, None).unwrap().is_some());
        assert!(dir.path().join("bucket").exists());
        assert!(registry.resolve(Channel::MessagingBlob, None).is_err());
    }
}
