use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{ManageError, ManageResult};
use crate::metadata::{keys, MetadataStore, MetadataStoreExt};
use crate::models::index::TagIdList;
use crate::models::{generate_id, Tag, TagRequest};
use crate::services::file_service::FileService;
use crate::services::index_manager::{AssociationIndex, TagIndex};

/// Tag records, the tag index and file <-> tag associations
#[derive(Clone)]
pub struct TagService {
    store: Arc<dyn MetadataStore>,
    index: TagIndex,
    files: FileService,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl TagService {
    pub fn new(store: Arc<dyn MetadataStore>, files: FileService) -> Self {
        Self {
            index: TagIndex::new(store.clone()),
            store,
            files,
        }
    }

    async fn tag_ids(&self) -> ManageResult<TagIdList> {
        Ok(self
            .store
            .get_record(keys::TAGS_INDEX)
            .await?
            .unwrap_or_default())
    }

    /// A tag with its member count filled in
    pub async fn find_tag(&self, tag_id: &str) -> ManageResult<Option<Tag>> {
        if tag_id.is_empty() || tag_id == "index" {
            return Ok(None);
        }
        let Some(mut tag) = self.store.get_json::<Tag>(&keys::tag(tag_id)).await? else {
            return Ok(None);
        };
        tag.file_count = self.index.list_members(tag_id).await?.len();
        Ok(Some(tag))
    }

    pub async fn get_tag(&self, tag_id: &str) -> ManageResult<Tag> {
        self.find_tag(tag_id)
            .await?
            .ok_or_else(|| ManageError::not_found("Tag not found"))
    }

    pub async fn list_tags(&self) -> ManageResult<Vec<Tag>> {
        let mut tags = Vec::new();
        for tag_id in self.tag_ids().await?.tags {
            match self.find_tag(&tag_id).await? {
                Some(tag) => tags.push(tag),
                None => warn!("Tag index lists {} but the tag record is missing", tag_id),
            }
        }
        Ok(tags)
    }

    async fn ensure_unique_name(&self, name: &str, except: Option<&str>) -> ManageResult<()> {
        let wanted = normalize_name(name);
        let clash = self
            .list_tags()
            .await?
            .into_iter()
            .any(|t| Some(t.id.as_str()) != except && normalize_name(&t.name) == wanted);
        if clash {
            return Err(ManageError::conflict("Tag name already exists"));
        }
        Ok(())
    }

    pub async fn create_tag(&self, request: TagRequest) -> ManageResult<Tag> {
        let name = request.name.trim();
        let color = request.color.trim();
        if name.is_empty() || color.is_empty() {
            return Err(ManageError::validation("Name and color are required"));
        }
        self.ensure_unique_name(name, None).await?;

        let now = Utc::now();
        let tag = Tag {
            id: generate_id("tag"),
            name: name.to_string(),
            color: color.to_string(),
            description: request.description.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            file_count: 0,
        };
        self.store.put_json(&keys::tag(&tag.id), &tag).await?;

        let mut index = self.tag_ids().await?;
        index.tags.push(tag.id.clone());
        self.store.put_json(keys::TAGS_INDEX, &index).await?;
        self.index.init_owner(&tag.id).await?;

        info!("Created tag {} ({})", tag.name, tag.id);
        Ok(tag)
    }

    /// Update name, color and description; empty fields keep their value
    pub async fn update_tag(&self, tag_id: &str, request: TagRequest) -> ManageResult<Tag> {
        let mut tag = self.get_tag(tag_id).await?;
        let name = request.name.trim();
        if !name.is_empty() && normalize_name(name) != normalize_name(&tag.name) {
            self.ensure_unique_name(name, Some(tag_id)).await?;
        }
        if !name.is_empty() {
            tag.name = name.to_string();
        }
        if !request.color.trim().is_empty() {
            tag.color = request.color.trim().to_string();
        }
        if let Some(description) = request.description {
            tag.description = description;
        }
        tag.updated_at = Utc::now();

        let mut stored = tag.clone();
        stored.file_count = 0;
        self.store.put_json(&keys::tag(tag_id), &stored).await?;
        info!("Updated tag {}", tag_id);
        Ok(tag)
    }

    /// Delete a tag; every file loses it first
    pub async fn delete_tag(&self, tag_id: &str) -> ManageResult<usize> {
        self.get_tag(tag_id).await?;
        let cleaned = self.index.purge_owner(tag_id).await?;
        self.store.delete(&keys::tag(tag_id)).await?;

        let mut index = self.tag_ids().await?;
        index.tags.retain(|t| t != tag_id);
        self.store.put_json(keys::TAGS_INDEX, &index).await?;

        info!("Deleted tag {} and removed it from {} files", tag_id, cleaned);
        Ok(cleaned)
    }

    /// Resolve a tag reference given as an id or a case-insensitive name
    pub async fn resolve_tag_ref(&self, reference: &str) -> ManageResult<Option<String>> {
        if self.find_tag(reference).await?.is_some() {
            return Ok(Some(reference.to_string()));
        }
        let wanted = normalize_name(reference);
        Ok(self
            .list_tags()
            .await?
            .into_iter()
            .find(|t| normalize_name(&t.name) == wanted)
            .map(|t| t.id))
    }

    /// Keep only the ids that name existing tags
    pub async fn valid_tag_ids(&self, tag_ids: &[String]) -> ManageResult<Vec<String>> {
        let mut valid = Vec::new();
        for tag_id in tag_ids {
            if valid.contains(tag_id) {
                continue;
            }
            if self.find_tag(tag_id).await?.is_some() {
                valid.push(tag_id.clone());
            } else {
                warn!("Ignoring unknown tag id {}", tag_id);
            }
        }
        Ok(valid)
    }

    pub async fn tag_members(&self, tag_id: &str) -> ManageResult<Vec<String>> {
        Ok(self.index.list_members(tag_id).await?)
    }

    pub async fn file_tag_ids(&self, path: &str) -> ManageResult<Vec<String>> {
        Ok(self.index.list_owners(path).await?)
    }

    pub async fn file_tags(&self, path: &str) -> ManageResult<Vec<Tag>> {
        self.files.require_record(path).await?;
        let mut tags = Vec::new();
        for tag_id in self.file_tag_ids(path).await? {
            if let Some(tag) = self.find_tag(&tag_id).await? {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    async fn checked_tag_ids(&self, path: &str, tag_ids: &[String]) -> ManageResult<Vec<String>> {
        if tag_ids.is_empty() {
            return Err(ManageError::validation("Tag IDs array is required"));
        }
        self.files.require_record(path).await?;
        let valid = self.valid_tag_ids(tag_ids).await?;
        if valid.is_empty() {
            return Err(ManageError::validation("No valid tags found"));
        }
        Ok(valid)
    }

    /// Add tags to a file without checking anything; used by batches that
    /// validated up front
    pub async fn tag_file(&self, path: &str, tag_ids: &[String]) -> ManageResult<Vec<String>> {
        let mut added = Vec::new();
        for tag_id in tag_ids {
            if self.index.add_association(tag_id, path).await? {
                added.push(tag_id.clone());
            }
        }
        Ok(added)
    }

    /// Returns the ids that were newly added and the file's tags afterwards
    pub async fn add_file_tags(&self, path: &str, tag_ids: &[String]) -> ManageResult<(Vec<String>, Vec<Tag>)> {
        let valid = self.checked_tag_ids(path, tag_ids).await?;
        let added = self.tag_file(path, &valid).await?;
        info!("Added {} tags to {}", added.len(), path);
        Ok((added, self.file_tags(path).await?))
    }

    pub async fn remove_file_tags(&self, path: &str, tag_ids: &[String]) -> ManageResult<(Vec<String>, Vec<Tag>)> {
        let valid = self.checked_tag_ids(path, tag_ids).await?;
        let mut removed = Vec::new();
        for tag_id in &valid {
            if self.index.remove_association(tag_id, path).await? {
                removed.push(tag_id.clone());
            }
        }
        info!("Removed {} tags from {}", removed.len(), path);
        Ok((removed, self.file_tags(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use crate::storage::ChannelRegistry;
    use serde_json::json;

    async fn service() -> TagService {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        for path in ["x.jpg", "y.jpg"] {
            store
                .put(path, "", Some(&json!({"FileName": path, "Channel": "CloudflareR2"})))
                .await
                .unwrap();
        }
        let files = FileService::new(store.clone(), Arc::new(ChannelRegistry::new()));
        TagService::new(store, files)
    }

    fn request(name: &str, color: &str) -> TagRequest {
        TagRequest {
            name: name.into(),
            color: color.into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_name_and_color() {
        let service = service().await;
        let err = service.create_tag(request(" ", "#fff")).await.unwrap_err();
        assert_eq!(err.to_string(), "Name and color are required");
    }

    #[tokio::test]
    async fn test_duplicate_names_conflict_case_insensitively() {
        let service = service().await;
        service.create_tag(request("Important", "#F56C6C")).await.unwrap();
        let err = service.create_tag(request("  important ", "#000")).await.unwrap_err();
        assert!(matches!(err, ManageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_adding_twice_does_not_double_count() {
        let service = service().await;
        let tag = service.create_tag(request("Cats", "#111")).await.unwrap();
        let ids = vec![tag.id.clone()];

        let (added, tags) = service.add_file_tags("x.jpg", &ids).await.unwrap();
        assert_eq!(added, ids);
        assert_eq!(tags[0].file_count, 1);

        let (added, tags) = service.add_file_tags("x.jpg", &ids).await.unwrap();
        assert!(added.is_empty());
        assert_eq!(tags[0].file_count, 1);
    }

    #[tokio::test]
    async fn test_file_tag_validation() {
        let service = service().await;
        let err = service.add_file_tags("x.jpg", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "Tag IDs array is required");

        let err = service
            .add_file_tags("x.jpg", &["tag_missing".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No valid tags found");

        let err = service
            .add_file_tags("nope.jpg", &["tag_missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ManageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_files() {
        let service = service().await;
        let tag = service.create_tag(request("Trip", "#222")).await.unwrap();
        let ids = vec![tag.id.clone()];
        service.add_file_tags("x.jpg", &ids).await.unwrap();
        service.add_file_tags("y.jpg", &ids).await.unwrap();

        assert_eq!(service.delete_tag(&tag.id).await.unwrap(), 2);
        assert!(service.file_tag_ids("x.jpg").await.unwrap().is_empty());
        assert!(service.file_tag_ids("y.jpg").await.unwrap().is_empty());
        assert!(service.list_tags().await.unwrap().is_empty());
        assert!(matches!(service.get_tag(&tag.id).await, Err(ManageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_and_resolve_by_name() {
        let service = service().await;
        let tag = service.create_tag(request("Old", "#333")).await.unwrap();
        let other = service.create_tag(request("Other", "#444")).await.unwrap();

        let updated = service.update_tag(&tag.id, request("New", "")).await.unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.color, "#333");

        assert!(matches!(
            service.update_tag(&other.id, request("NEW", "")).await,
            Err(ManageError::Conflict(_))
        ));
        assert_eq!(service.resolve_tag_ref("new").await.unwrap(), Some(tag.id.clone()));
        assert_eq!(service.resolve_tag_ref(&other.id).await.unwrap(), Some(other.id));
        assert_eq!(service.resolve_tag_ref("index").await.unwrap(), None);
    }
}
