use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::errors::{ManageError, ManageResult};
use crate::metadata::{keys, KeyEntry, MetadataStore, MetadataStoreExt, StoreError};
use crate::models::{basename, parent_dir, Channel, FileMetadata, FileRecord, StorageLocator};
use crate::storage::{ChannelRegistry, StorageChannel, StorageError};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Parse the metadata half of a listed key. Records that cannot be read are
/// skipped with a warning so one bad record does not fail a whole scan.
fn listed_record(key: KeyEntry) -> Option<FileRecord> {
    let value = key.metadata?;
    match serde_json::from_value::<FileMetadata>(value) {
        Ok(metadata) => Some(FileRecord {
            path: key.name,
            value: String::new(),
            metadata,
        }),
        Err(e) => {
            warn!("Skipping unreadable file record {}: {}", key.name, e);
            None
        }
    }
}

/// File records and the bytes behind them. Index upkeep is left to the caller.
#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn MetadataStore>,
    channels: Arc<ChannelRegistry>,
}

impl FileService {
    pub fn new(store: Arc<dyn MetadataStore>, channels: Arc<ChannelRegistry>) -> Self {
        Self { store, channels }
    }

    fn validate_path(path: &str) -> ManageResult<()> {
        if path.trim().is_empty() {
            return Err(ManageError::validation("File id is required"));
        }
        if keys::is_reserved(path) {
            return Err(ManageError::validation(format!("'{}' is not a valid file id", path)));
        }
        Ok(())
    }

    /// The record at `path`, if it is a file. Reserved keys are never files.
    pub async fn get_record(&self, path: &str) -> ManageResult<Option<FileRecord>> {
        if path.is_empty() || keys::is_reserved(path) {
            return Ok(None);
        }
        let Some(entry) = self.store.get(path).await? else {
            return Ok(None);
        };
        let metadata = match entry.metadata {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                key: path.to_string(),
                source,
            })?,
            None => FileMetadata::default(),
        };
        Ok(Some(FileRecord {
            path: path.to_string(),
            value: entry.value,
            metadata,
        }))
    }

    /// Every file record under `prefix`, reserved namespaces excluded
    pub async fn scan(&self, prefix: &str) -> ManageResult<Vec<FileRecord>> {
        Ok(self
            .store
            .list_all(prefix)
            .await?
            .into_iter()
            .filter(|key| !keys::is_reserved(&key.name))
            .filter_map(listed_record)
            .collect())
    }

    pub async fn exists(&self, path: &str) -> ManageResult<bool> {
        Ok(self.get_record(path).await?.is_some())
    }

    pub async fn require_record(&self, path: &str) -> ManageResult<FileRecord> {
        self.get_record(path)
            .await?
            .ok_or_else(|| ManageError::not_found("File not found"))
    }

    async fn write_record(&self, record: &FileRecord) -> ManageResult<()> {
        self.store
            .put(&record.path, &record.value, Some(&record.metadata.to_value()))
            .await?;
        Ok(())
    }

    fn adapter_for(&self, record: &FileRecord) -> ManageResult<(Option<Arc<dyn StorageChannel>>, Option<StorageLocator>)> {
        let locator = record.metadata.resolve_locator(&record.path);
        let adapter = self
            .channels
            .resolve(record.metadata.channel(), locator.as_ref())?;
        if adapter.is_some() && locator.is_none() {
            warn!(
                "File {} on channel {} has no locator; treating it as metadata-only",
                record.path,
                record.metadata.channel_label()
            );
            return Ok((None, None));
        }
        Ok((adapter, locator))
    }

    fn integrity_error(path: &str, err: StorageError) -> ManageError {
        if err.is_not_found() {
            error!(
                "Data integrity error: {} is recorded in metadata but missing from its channel ({})",
                path, err
            );
            ManageError::Integrity {
                path: path.to_string(),
            }
        } else {
            ManageError::Storage(err)
        }
    }

    /// Upload bytes through a channel and create the record pointing at them
    pub async fn store_file(
        &self,
        path: &str,
        data: &[u8],
        channel: Channel,
        file_type: Option<&str>,
    ) -> ManageResult<FileRecord> {
        Self::validate_path(path)?;
        if self.exists(path).await? {
            return Err(ManageError::conflict("A file with this id already exists"));
        }

        let locator = match self.channels.resolve(channel, None)? {
            Some(adapter) => Some(adapter.put(path, data).await?),
            None => None,
        };

        let size_mb = data.len() as f64 / BYTES_PER_MB;
        let file_type = file_type
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());

        let mut metadata = FileMetadata {
            file_name: Some(path.to_string()),
            file_type: Some(file_type),
            timestamp: Some(Utc::now().timestamp_millis()),
            directory: Some(parent_dir(path).to_string()),
            locator,
            ..Default::default()
        };
        metadata.set_channel(channel);
        metadata.set_file_size(size_mb);
        let record = FileRecord {
            path: path.to_string(),
            value: String::new(),
            metadata,
        };

        if let Err(e) = self.write_record(&record).await {
            error!("Stored {} on {} but failed to write its record; object is orphaned: {}", path, channel, e);
            return Err(e);
        }
        info!("Stored file {} on channel {}", path, channel);
        Ok(record)
    }

    /// Fetch a file's bytes through its channel
    pub async fn read_file(&self, path: &str) -> ManageResult<(FileRecord, Vec<u8>)> {
        let record = self.require_record(path).await?;
        let (adapter, locator) = self.adapter_for(&record)?;
        let (Some(adapter), Some(locator)) = (adapter, locator) else {
            return Err(ManageError::not_found(format!(
                "Content of {} is not held by a managed channel",
                path
            )));
        };
        let data = adapter
            .get(&locator)
            .await
            .map_err(|e| Self::integrity_error(path, e))?;
        Ok((record, data))
    }

    /// Delete the bytes, then the record
    pub async fn delete_file(&self, path: &str) -> ManageResult<FileRecord> {
        let record = self.require_record(path).await?;
        let (adapter, locator) = self.adapter_for(&record)?;
        if let (Some(adapter), Some(locator)) = (adapter, locator) {
            match adapter.delete(&locator).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!("Bytes of {} were already gone from {}", path, record.metadata.channel_label())
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.store.delete(path).await?;
        info!("Deleted file {}", path);
        Ok(record)
    }

    /// Move a file to `to`. Path-addressed channels copy the bytes to the new
    /// key; other channels keep their locator and only the record moves.
    pub async fn move_file(&self, from: &str, to: &str) -> ManageResult<FileRecord> {
        Self::validate_path(to)?;
        let record = self.require_record(from).await?;
        if self.exists(to).await? {
            return Err(ManageError::conflict(format!("Target file already exists: {}", to)));
        }

        let (adapter, locator) = self.adapter_for(&record)?;
        let mut old_bytes = None;
        let new_locator = match (adapter, locator) {
            (Some(adapter), Some(locator)) if adapter.path_addressed() => {
                let moved = adapter
                    .copy(&locator, to)
                    .await
                    .map_err(|e| Self::integrity_error(from, e))?;
                old_bytes = Some((adapter, locator));
                Some(moved)
            }
            (_, locator) => locator,
        };

        let mut metadata = record.metadata.clone();
        metadata.relocate(to, new_locator);
        let moved = FileRecord {
            path: to.to_string(),
            value: record.value.clone(),
            metadata,
        };

        if let Err(e) = self.write_record(&moved).await {
            error!("Moved bytes of {} to {} but failed to write the new record; object is orphaned: {}", from, to, e);
            return Err(e);
        }
        self.store.delete(from).await?;

        if let Some((adapter, locator)) = old_bytes {
            if let Err(e) = adapter.delete(&locator).await {
                warn!("Moved {} to {} but could not delete the old object: {}", from, to, e);
            }
        }

        info!("Moved file {} -> {}", from, to);
        Ok(moved)
    }

    /// Copy a file to `to`; every managed channel stores a second object
    pub async fn copy_file(&self, from: &str, to: &str) -> ManageResult<FileRecord> {
        Self::validate_path(to)?;
        let record = self.require_record(from).await?;
        if self.exists(to).await? {
            return Err(ManageError::conflict(format!("Target file already exists: {}", to)));
        }

        let (adapter, locator) = self.adapter_for(&record)?;
        let new_locator = match (adapter, locator) {
            (Some(adapter), Some(locator)) => Some(
                adapter
                    .copy(&locator, to)
                    .await
                    .map_err(|e| Self::integrity_error(from, e))?,
            ),
            (_, locator) => locator,
        };

        let mut metadata = record.metadata.clone();
        metadata.relocate(to, new_locator);
        metadata.timestamp = Some(Utc::now().timestamp_millis());
        let copied = FileRecord {
            path: to.to_string(),
            value: record.value.clone(),
            metadata,
        };

        if let Err(e) = self.write_record(&copied).await {
            error!("Copied bytes of {} to {} but failed to write the record; object is orphaned: {}", from, to, e);
            return Err(e);
        }
        info!("Copied file {} -> {}", from, to);
        Ok(copied)
    }

    /// Replace the last path segment
    pub async fn rename_file(&self, path: &str, new_name: &str) -> ManageResult<FileRecord> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(ManageError::validation("New name is required"));
        }
        if new_name.contains('/') {
            return Err(ManageError::validation("New name must not contain '/'"));
        }
        let new_path = match parent_dir(path) {
            "" => new_name.to_string(),
            parent => format!("{}/{}", parent, new_name),
        };
        if self.exists(&new_path).await? {
            return Err(ManageError::conflict("A file with the new name already exists"));
        }
        self.move_file(path, &new_path).await
    }

    /// Where a move/copy of `path` into `target_dir` lands
    pub fn relocation_target(path: &str, target_dir: &str) -> String {
        let dir = target_dir.trim().trim_matches('/');
        if dir.is_empty() {
            basename(path).to_string()
        } else {
            format!("{}/{}", dir, basename(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use crate::storage::memory::MemoryChannel;
    use serde_json::json;

    struct Fixture {
        service: FileService,
        store: Arc<MemoryMetadataStore>,
        bucket: Arc<MemoryChannel>,
        messaging: Arc<MemoryChannel>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryMetadataStore::new());
        let bucket = Arc::new(MemoryChannel::object_store());
        let messaging = Arc::new(MemoryChannel::messaging());
        let registry = ChannelRegistry::new()
            .with_object_store(bucket.clone())
            .with_messaging(messaging.clone());
        Fixture {
            service: FileService::new(store.clone(), Arc::new(registry)),
            store,
            bucket,
            messaging,
        }
    }

    #[tokio::test]
    async fn test_store_and_read() {
        let f = fixture();
        let record = f
            .service
            .store_file("albums/cat.jpg", b"meow", Channel::ObjectStore, None)
            .await
            .unwrap();
        assert_eq!(record.metadata.file_type.as_deref(), Some("image/jpeg"));
        assert_eq!(record.metadata.directory.as_deref(), Some("albums"));

        let (_, data) = f.service.read_file("albums/cat.jpg").await.unwrap();
        assert_eq!(data, b"meow");

        let again = f
            .service
            .store_file("albums/cat.jpg", b"meow", Channel::ObjectStore, None)
            .await;
        assert!(matches!(again, Err(ManageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_missing_bytes_is_integrity_error() {
        let f = fixture();
        f.store
            .put("ghost.png", "", Some(&json!({"Channel": "CloudflareR2"})))
            .await
            .unwrap();
        let err = f.service.read_file("ghost.png").await.unwrap_err();
        assert!(matches!(err, ManageError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_move_on_path_addressed_channel_moves_bytes() {
        let f = fixture();
        f.service
            .store_file("a.jpg", b"x", Channel::ObjectStore, None)
            .await
            .unwrap();

        let moved = f.service.move_file("a.jpg", "trip/a.jpg").await.unwrap();
        assert_eq!(moved.metadata.locator, Some(StorageLocator::Bucket { key: "trip/a.jpg".into() }));
        assert!(!f.service.exists("a.jpg").await.unwrap());
        assert!(f.service.exists("trip/a.jpg").await.unwrap());
        assert!(!f.bucket.contains(&StorageLocator::Bucket { key: "a.jpg".into() }).await);
        assert_eq!(f.bucket.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_move_on_messaging_channel_keeps_locator() {
        let f = fixture();
        let stored = f
            .service
            .store_file("a.jpg", b"x", Channel::MessagingBlob, None)
            .await
            .unwrap();

        let moved = f.service.move_file("a.jpg", "b/a.jpg").await.unwrap();
        assert_eq!(moved.metadata.locator, stored.metadata.locator);
        assert_eq!(f.messaging.object_count().await, 1);

        let copied = f.service.copy_file("b/a.jpg", "c/a.jpg").await.unwrap();
        assert_ne!(copied.metadata.locator, stored.metadata.locator);
        assert_eq!(f.messaging.object_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_metadata_only() {
        let f = fixture();
        f.store
            .put("legacy.gif", "", Some(&json!({"Channel": "Discord", "FileName": "legacy.gif"})))
            .await
            .unwrap();

        f.service.move_file("legacy.gif", "old/legacy.gif").await.unwrap();
        f.service.delete_file("old/legacy.gif").await.unwrap();
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_move_keeps_value_and_unmanaged_channel_name() {
        let f = fixture();
        f.store
            .put(
                "ext.jpg",
                "payload",
                Some(&json!({"Channel": "External", "FileName": "ext.jpg", "FileSize": "0.12", "Folder": ""})),
            )
            .await
            .unwrap();

        f.service.move_file("ext.jpg", "d/ext.jpg").await.unwrap();

        let entry = f.store.get("d/ext.jpg").await.unwrap().unwrap();
        assert_eq!(entry.value, "payload");
        let meta = entry.metadata.unwrap();
        assert_eq!(meta["Channel"], "External");
        assert_eq!(meta["Folder"], "d");
        assert_eq!(meta["FileName"], "d/ext.jpg");
        assert_eq!(meta["FileSize"], "0.12");

        let copied = f.service.copy_file("d/ext.jpg", "e/ext.jpg").await.unwrap();
        assert_eq!(copied.value, "payload");
        assert_eq!(copied.metadata.channel_label(), "External");
    }

    #[tokio::test]
    async fn test_move_refuses_to_overwrite() {
        let f = fixture();
        f.service.store_file("a.jpg", b"1", Channel::ObjectStore, None).await.unwrap();
        f.service.store_file("d/a.jpg", b"2", Channel::ObjectStore, None).await.unwrap();

        let err = f.service.move_file("a.jpg", "d/a.jpg").await.unwrap_err();
        assert!(matches!(err, ManageError::Conflict(_)));
        let (_, data) = f.service.read_file("d/a.jpg").await.unwrap();
        assert_eq!(data, b"2");
    }

    #[tokio::test]
    async fn test_rename_replaces_last_segment() {
        let f = fixture();
        f.service.store_file("p/old.png", b"1", Channel::ObjectStore, None).await.unwrap();

        let renamed = f.service.rename_file("p/old.png", "new.png").await.unwrap();
        assert_eq!(renamed.path, "p/new.png");
        assert_eq!(renamed.metadata.file_name.as_deref(), Some("p/new.png"));

        assert!(matches!(
            f.service.rename_file("p/new.png", "  ").await,
            Err(ManageError::Validation(_))
        ));
        assert!(matches!(
            f.service.rename_file("p/missing.png", "x.png").await,
            Err(ManageError::NotFound(_))
        ));
    }

    #[test]
    fn test_relocation_target() {
        assert_eq!(FileService::relocation_target("a/b.jpg", "dest"), "dest/b.jpg");
        assert_eq!(FileService::relocation_target("a/b.jpg", "/dest/"), "dest/b.jpg");
        assert_eq!(FileService::relocation_target("a/b.jpg", "/"), "b.jpg");
    }
}
