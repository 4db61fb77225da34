use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::errors::{ManageError, ManageResult};
use crate::metadata::{keys, MetadataStore, MetadataStoreExt, StoreError};
use crate::models::{
    default_permissions, folder_kind, BatchCreateFoldersRequest, BatchCreateFoldersResult,
    BatchFolderSummary, CreateFolderRequest, Folder, FolderChild, FolderCreated, FolderError,
    FolderSpec,
};

static FOLDER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[^<>:"/\\|?*\x00-\x1f]+$"#).expect("folder name pattern is valid"));

/// Absolute form of a folder path: leading `/`, no empty segments, no
/// trailing `/` (the root is `/`)
fn absolute_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').map(str::trim).filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Parent path of new folders, absolute and ending in `/`
fn parent_path(path: Option<&str>) -> String {
    match absolute_path(path.unwrap_or_default()).as_str() {
        "/" => "/".to_string(),
        parent => format!("{}/", parent),
    }
}

pub fn valid_folder_name(name: &str) -> bool {
    FOLDER_NAME.is_match(name.trim())
}

#[derive(Clone)]
pub struct FolderService {
    store: Arc<dyn MetadataStore>,
    max_batch_folders: usize,
}

impl FolderService {
    pub fn new(store: Arc<dyn MetadataStore>, max_batch_folders: usize) -> Self {
        Self {
            store,
            max_batch_folders,
        }
    }

    pub async fn get_folder(&self, full_path: &str) -> ManageResult<Folder> {
        let full_path = absolute_path(full_path);
        self.store
            .get_json::<Folder>(&keys::folder(&full_path))
            .await?
            .ok_or_else(|| ManageError::not_found("Folder not found"))
    }

    async fn write_folder(&self, folder: &Folder) -> ManageResult<()> {
        let key = keys::folder(&folder.full_path);
        let body = serde_json::to_string(folder).map_err(|source| StoreError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let listing = json!({
            "type": folder.kind,
            "path": folder.path,
            "name": folder.name,
            "createdAt": folder.created_at,
        });
        self.store.put(&key, &body, Some(&listing)).await?;
        Ok(())
    }

    /// Validate, check for a clash and write one folder record
    async fn create_one(&self, spec: FolderSpec, parent: &str) -> ManageResult<Folder> {
        if spec.name.trim().is_empty() {
            return Err(ManageError::validation("Folder name is required"));
        }
        if !valid_folder_name(&spec.name) {
            return Err(ManageError::validation("Folder name contains invalid characters"));
        }
        let name = spec.name.trim().to_string();
        let full_path = format!("{}{}", parent, name);
        if self.store.get(&keys::folder(&full_path)).await?.is_some() {
            return Err(ManageError::conflict("Folder already exists"));
        }

        let now = Utc::now();
        let folder = Folder {
            name,
            path: parent.to_string(),
            full_path,
            kind: folder_kind(),
            description: spec.description.unwrap_or_default().trim().to_string(),
            permissions: spec.permissions.unwrap_or_else(default_permissions),
            tags: spec.tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            size: 0,
            item_count: 0,
            children: Vec::new(),
        };
        self.write_folder(&folder).await?;
        self.attach_to_parent(&folder).await;
        Ok(folder)
    }

    /// Record a new folder in its parent's children. The parent is the folder
    /// whose full path is this folder's parent path; it may not exist.
    async fn attach_to_parent(&self, folder: &Folder) {
        if folder.path == "/" {
            return;
        }
        let parent_full_path = folder.path.trim_end_matches('/');
        let result = async {
            let Some(mut parent) = self
                .store
                .get_json::<Folder>(&keys::folder(parent_full_path))
                .await?
            else {
                return Ok::<bool, ManageError>(false);
            };
            if !parent.children.iter().any(|c| c.path == folder.full_path) {
                parent.children.push(FolderChild {
                    name: folder.name.clone(),
                    kind: folder_kind(),
                    path: folder.full_path.clone(),
                });
            }
            parent.item_count = parent.children.len();
            parent.updated_at = Utc::now();
            self.write_folder(&parent).await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(true) => info!("Added {} to parent folder {}", folder.full_path, parent_full_path),
            Ok(false) => {}
            Err(e) => error!(
                "Created folder {} but failed to update parent {}: {}",
                folder.full_path, parent_full_path, e
            ),
        }
    }

    pub async fn create_folder(&self, request: CreateFolderRequest) -> ManageResult<Folder> {
        let parent = parent_path(request.path.as_deref());
        let folder = self
            .create_one(
                FolderSpec {
                    name: request.name,
                    description: request.description,
                    permissions: request.permissions,
                    tags: request.tags,
                },
                &parent,
            )
            .await?;
        info!("Created folder {}", folder.full_path);
        Ok(folder)
    }

    /// Create many folders under one parent; each failure is reported per item
    pub async fn batch_create(&self, request: BatchCreateFoldersRequest) -> ManageResult<BatchCreateFoldersResult> {
        if request.folders.is_empty() {
            return Err(ManageError::validation("Folder list must not be empty"));
        }
        if request.folders.len() > self.max_batch_folders {
            return Err(ManageError::validation(format!(
                "At most {} folders can be created at once",
                self.max_batch_folders
            )));
        }

        let parent = parent_path(request.path.as_deref());
        let total = request.folders.len();
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for spec in request.folders {
            let name = if spec.name.trim().is_empty() {
                "unnamed".to_string()
            } else {
                spec.name.clone()
            };
            match self.create_one(spec, &parent).await {
                Ok(folder) => results.push(FolderCreated {
                    name,
                    path: folder.full_path.clone(),
                    success: true,
                    metadata: folder,
                }),
                Err(e) => errors.push(FolderError {
                    name,
                    error: e.to_string(),
                }),
            }
        }

        let success_rate = if total == 0 {
            0.0
        } else {
            results.len() as f64 / total as f64 * 100.0
        };
        info!(
            "Batch folder create under {}: {} created, {} failed",
            parent,
            results.len(),
            errors.len()
        );
        Ok(BatchCreateFoldersResult {
            summary: BatchFolderSummary {
                total,
                success: results.len(),
                failed: errors.len(),
                success_rate: format!("{:.2}", success_rate),
            },
            results,
            errors,
        })
    }
}
