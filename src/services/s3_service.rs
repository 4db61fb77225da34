use anyhow::anyhow;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, warn};

use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region as AwsRegion;

use crate::models::{Channel, S3ChannelConfig, StorageLocator};
use crate::storage::{StorageChannel, StorageError, StorageResult};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 100;

/// S3-compatible channel for one configured bucket/credential profile
#[derive(Debug, Clone)]
pub struct S3Service {
    client: Client,
    config: S3ChannelConfig,
}

impl S3Service {
    pub async fn new(config: S3ChannelConfig) -> anyhow::Result<Self> {
        // Validate required fields
        if config.bucket_name.is_empty() {
            return Err(anyhow!("Bucket name is required"));
        }
        if config.access_key_id.is_empty() {
            return Err(anyhow!("Access key ID is required"));
        }
        if config.secret_access_key.is_empty() {
            return Err(anyhow!("Secret access key is required"));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None, // session token
            None, // expiry
            "imghub-s3-channel",
        );

        let region = if config.region.is_empty() {
            "us-east-1".to_string()
        } else {
            config.region.clone()
        };

        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .region(AwsRegion::new(region))
            .credentials_provider(credentials)
            .behavior_version_latest();

        // Set custom endpoint if provided (for S3-compatible services)
        if let Some(endpoint_url) = &config.endpoint_url {
            if !endpoint_url.is_empty() {
                s3_config_builder = s3_config_builder.endpoint_url(endpoint_url).force_path_style(true);
                info!("Using custom S3 endpoint: {}", endpoint_url);
            }
        }

        let client = Client::from_conf(s3_config_builder.build());
        Ok(Self { client, config })
    }

    pub fn get_config(&self) -> &S3ChannelConfig {
        &self.config
    }

    /// Test S3 connection and access to bucket
    pub async fn test_connection(&self) -> anyhow::Result<String> {
        info!("Testing S3 connection to bucket: {}", self.config.bucket_name);

        self.client
            .head_bucket()
            .bucket(&self.config.bucket_name)
            .send()
            .await
            .map_err(|e| anyhow!("Cannot access bucket {}: {}", self.config.bucket_name, e))?;

        Ok(format!(
            "Successfully connected to S3 bucket '{}' (profile '{}')",
            self.config.bucket_name, self.config.profile
        ))
    }

    /// Bucket and key addressed by a locator; an empty bucket means this profile's bucket
    fn object_of(&self, locator: &StorageLocator) -> StorageResult<(String, String)> {
        match locator {
            StorageLocator::S3 { bucket, key, .. } => {
                let bucket = if bucket.is_empty() {
                    self.config.bucket_name.clone()
                } else {
                    bucket.clone()
                };
                Ok((bucket, key.clone()))
            }
            other => Err(StorageError::LocatorMismatch {
                expected: Channel::S3,
                found: other.channel(),
            }),
        }
    }

    fn locator_for(&self, key: &str) -> StorageLocator {
        StorageLocator::S3 {
            bucket: self.config.bucket_name.clone(),
            key: key.to_string(),
            profile: self.config.profile.clone(),
        }
    }

    pub fn content_type_for(key: &str) -> String {
        mime_guess::from_path(key).first_or_octet_stream().to_string()
    }

    /// Retry wrapper for S3 operations with exponential backoff. A missing
    /// object is a final answer and is never retried.
    async fn retry_operation<T, F, Fut>(&self, operation_name: &str, operation: F) -> StorageResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("S3 operation '{}' succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) if attempt < MAX_RETRIES => {
                    let delay_ms = BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        "S3 operation '{}' failed (attempt {}/{}), retrying in {}ms: {}",
                        operation_name,
                        attempt + 1,
                        MAX_RETRIES + 1,
                        delay_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "S3 operation '{}' failed after {} attempts: {}",
                        operation_name,
                        MAX_RETRIES + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl StorageChannel for S3Service {
    fn channel(&self) -> Channel {
        Channel::S3
    }

    fn storage_type(&self) -> &'static str {
        "s3"
    }

    async fn initialize(&self) -> StorageResult<()> {
        let message = self.test_connection().await?;
        info!("{}", message);
        Ok(())
    }

    async fn get(&self, locator: &StorageLocator) -> StorageResult<Vec<u8>> {
        let (bucket, key) = self.object_of(locator)?;
        info!("Retrieving file from S3: {}/{}", bucket, key);

        let bytes = self
            .retry_operation(&format!("get: {}", key), || {
                let client = self.client.clone();
                let bucket = bucket.clone();
                let key = key.clone();
                async move {
                    let response = match client.get_object().bucket(&bucket).key(&key).send().await {
                        Ok(response) => response,
                        Err(e) => {
                            let missing = e
                                .as_service_error()
                                .map(|se| se.is_no_such_key())
                                .unwrap_or(false);
                            if missing {
                                return Err(StorageError::NotFound(key));
                            }
                            return Err(StorageError::Backend(anyhow!(
                                "Failed to retrieve file {}: {}",
                                key,
                                e
                            )));
                        }
                    };

                    let body = response
                        .body
                        .collect()
                        .await
                        .map_err(|e| anyhow!("Failed to read file body: {}", e))?;
                    Ok(body.into_bytes().to_vec())
                }
            })
            .await?;

        info!("Successfully retrieved file: {} ({} bytes)", key, bytes.len());
        Ok(bytes)
    }

    async fn put(&self, path: &str, data: &[u8]) -> StorageResult<StorageLocator> {
        let bucket = self.config.bucket_name.clone();
        let content_type = Self::content_type_for(path);

        self.retry_operation(&format!("put: {}", path), || {
            let client = self.client.clone();
            let bucket = bucket.clone();
            let key = path.to_string();
            let content_type = content_type.clone();
            let body = data.to_vec();
            async move {
                client
                    .put_object()
                    .bucket(&bucket)
                    .key(&key)
                    .body(ByteStream::from(body))
                    .content_type(content_type)
                    .send()
                    .await
                    .map_err(|e| anyhow!("Failed to store file {}: {}", key, e))?;
                Ok(())
            }
        })
        .await?;

        info!("Successfully stored file to S3: {}/{} ({} bytes)", bucket, path, data.len());
        Ok(self.locator_for(path))
    }

    async fn delete(&self, locator: &StorageLocator) -> StorageResult<()> {
        let (bucket, key) = self.object_of(locator)?;
        info!("Deleting file from S3: {}/{}", bucket, key);

        // DeleteObject succeeds for missing keys
        self.retry_operation(&format!("delete: {}", key), || {
            let client = self.client.clone();
            let bucket = bucket.clone();
            let key = key.clone();
            async move {
                client
                    .delete_object()
                    .bucket(&bucket)
                    .key(&key)
                    .send()
                    .await
                    .map_err(|e| anyhow!("Failed to delete file {}: {}", key, e))?;
                Ok(())
            }
        })
        .await
    }

    /// Server-side copy into this profile's bucket
    async fn copy(&self, locator: &StorageLocator, new_path: &str) -> StorageResult<StorageLocator> {
        let (source_bucket, source_key) = self.object_of(locator)?;
        let copy_source = format!("{}/{}", source_bucket, urlencoding::encode(&source_key));
        let bucket = self.config.bucket_name.clone();

        self.retry_operation(&format!("copy: {} -> {}", source_key, new_path), || {
            let client = self.client.clone();
            let bucket = bucket.clone();
            let copy_source = copy_source.clone();
            let key = new_path.to_string();
            let source_key = source_key.clone();
            async move {
                match client
                    .copy_object()
                    .bucket(&bucket)
                    .key(&key)
                    .copy_source(&copy_source)
                    .send()
                    .await
                {
                    Ok(_) => Ok(()),
                    Err(e) if e.to_string().contains("NoSuchKey") => Err(StorageError::NotFound(source_key)),
                    Err(e) => Err(StorageError::Backend(anyhow!(
                        "Failed to copy {} to {}: {}",
                        source_key,
                        key,
                        e
                    ))),
                }
            }
        })
        .await?;

        Ok(self.locator_for(new_path))
    }
}
