//! Applies one action to many files, one at a time, isolating failures
//!
//! Items run sequentially. A failed item is recorded and the batch moves on;
//! the request as a whole only fails when the batch itself is malformed.
//! Between items the executor checks a cancellation token, and whatever was
//! already applied stays applied.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{ManageError, ManageResult};
use crate::models::{BatchActionKind, BatchItemError, BatchResult, Relocation};
use crate::services::favorite_service::FavoriteService;
use crate::services::file_service::FileService;
use crate::services::index_manager::{FavoriteAdd, IndexFollowup};
use crate::services::tag_service::TagService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Delete,
    Move { target: String },
    Copy { target: String },
    AddTags { tag_ids: Vec<String> },
    AddToFavorites { group_id: String },
}

impl BatchOperation {
    /// Build a file operation from the `action`/`targetPath` pair of `POST /batch`
    pub fn from_action(action: &str, target_path: Option<&str>) -> ManageResult<Self> {
        let kind: BatchActionKind = serde_json::from_value(serde_json::Value::String(action.to_string()))
            .map_err(|_| ManageError::validation(format!("Unsupported action '{}'", action)))?;
        let target = || {
            target_path
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ManageError::validation(format!(
                        "Target path is required for {} operation",
                        kind.as_str()
                    ))
                })
        };
        Ok(match kind {
            BatchActionKind::Delete => BatchOperation::Delete,
            BatchActionKind::Move => BatchOperation::Move { target: target()? },
            BatchActionKind::Copy => BatchOperation::Copy { target: target()? },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BatchOperation::Delete => "delete",
            BatchOperation::Move { .. } => "move",
            BatchOperation::Copy { .. } => "copy",
            BatchOperation::AddTags { .. } => "add_tags",
            BatchOperation::AddToFavorites { .. } => "add_to_favorites",
        }
    }
}

enum ItemOutcome {
    Done,
    Skipped,
    Deleted,
    Moved(Relocation),
    Copied(Relocation),
}

/// Aggregated result plus the index work to run once the response is out
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub result: BatchResult,
    pub followup: IndexFollowup,
}

#[derive(Clone)]
pub struct BatchExecutor {
    files: FileService,
    tags: TagService,
    favorites: FavoriteService,
}

impl BatchExecutor {
    pub fn new(files: FileService, tags: TagService, favorites: FavoriteService) -> Self {
        Self {
            files,
            tags,
            favorites,
        }
    }

    /// Checks that need no per-item work; returns the operation to run
    async fn prepare(&self, operation: &BatchOperation) -> ManageResult<BatchOperation> {
        match operation {
            BatchOperation::AddTags { tag_ids } => {
                if tag_ids.is_empty() {
                    return Err(ManageError::validation(
                        "Tag IDs array is required and cannot be empty",
                    ));
                }
                let valid = self.tags.valid_tag_ids(tag_ids).await?;
                if valid.is_empty() {
                    return Err(ManageError::validation("No valid tags found"));
                }
                Ok(BatchOperation::AddTags { tag_ids: valid })
            }
            BatchOperation::AddToFavorites { group_id } => {
                self.favorites.get_group(group_id).await?;
                Ok(operation.clone())
            }
            other => Ok(other.clone()),
        }
    }

    async fn apply(&self, operation: &BatchOperation, path: &str) -> ManageResult<ItemOutcome> {
        match operation {
            BatchOperation::Delete => {
                self.files.delete_file(path).await?;
                Ok(ItemOutcome::Deleted)
            }
            BatchOperation::Move { target } => {
                let to = FileService::relocation_target(path, target);
                self.files.move_file(path, &to).await?;
                Ok(ItemOutcome::Moved(Relocation {
                    from: path.to_string(),
                    to,
                }))
            }
            BatchOperation::Copy { target } => {
                let to = FileService::relocation_target(path, target);
                self.files.copy_file(path, &to).await?;
                Ok(ItemOutcome::Copied(Relocation {
                    from: path.to_string(),
                    to,
                }))
            }
            BatchOperation::AddTags { tag_ids } => {
                self.files.require_record(path).await?;
                self.tags.tag_file(path, tag_ids).await?;
                Ok(ItemOutcome::Done)
            }
            BatchOperation::AddToFavorites { group_id } => {
                match self.favorites.favorite_file(path, Some(group_id), "").await? {
                    FavoriteAdd::Added(_) => Ok(ItemOutcome::Done),
                    FavoriteAdd::AlreadyPresent(_) => Ok(ItemOutcome::Skipped),
                }
            }
        }
    }

    /// Run `operation` over `items` until done or cancelled
    pub async fn run(
        &self,
        operation: &BatchOperation,
        items: &[String],
        cancel: &CancellationToken,
    ) -> ManageResult<BatchOutcome> {
        if items.is_empty() {
            return Err(ManageError::validation("File IDs array is required and cannot be empty"));
        }
        let operation = self.prepare(operation).await?;

        let mut result = BatchResult {
            action: operation.name().to_string(),
            total_files: items.len(),
            ..Default::default()
        };
        if let BatchOperation::AddTags { tag_ids } = &operation {
            result.total_tags = Some(tag_ids.len());
        }
        let mut followup = IndexFollowup::default();

        for (position, path) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                result.skipped = items[position..].to_vec();
                warn!(
                    "Batch {} cancelled after {} of {} items",
                    operation.name(),
                    position,
                    items.len()
                );
                break;
            }

            match self.apply(&operation, path).await {
                Ok(ItemOutcome::Skipped) => result.skipped_count += 1,
                Ok(outcome) => {
                    result.success_count += 1;
                    match outcome {
                        ItemOutcome::Deleted => followup.removed.push(path.clone()),
                        ItemOutcome::Moved(relocation) => {
                            followup.moved.push(relocation.clone());
                            result.moves.push(relocation);
                        }
                        ItemOutcome::Copied(relocation) => result.copies.push(relocation),
                        ItemOutcome::Done | ItemOutcome::Skipped => {}
                    }
                }
                Err(e) => {
                    warn!("Batch {} failed for {}: {}", operation.name(), path, e);
                    result.failed_count += 1;
                    result.errors.push(BatchItemError {
                        file: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.success = result.failed_count == 0;
        info!(
            "Batch {} finished: {} succeeded, {} failed, {} skipped",
            operation.name(),
            result.success_count,
            result.failed_count,
            result.skipped_count + result.skipped.len()
        );
        Ok(BatchOutcome { result, followup })
    }

    /// Run with a deadline after which remaining items are skipped
    pub async fn run_with_deadline(
        &self,
        operation: &BatchOperation,
        items: &[String],
        deadline: Duration,
    ) -> ManageResult<BatchOutcome> {
        let token = CancellationToken::new();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            })
        };
        let outcome = self.run(operation, items, &token).await;
        timer.abort();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MemoryMetadataStore, MetadataStore};
    use crate::models::{Channel, TagRequest, DEFAULT_GROUP_ID};
    use crate::storage::memory::MemoryChannel;
    use crate::storage::ChannelRegistry;
    use std::sync::Arc;

    struct Fixture {
        executor: BatchExecutor,
        files: FileService,
        tags: TagService,
        bucket: Arc<MemoryChannel>,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let bucket = Arc::new(MemoryChannel::object_store());
        let registry = ChannelRegistry::new().with_object_store(bucket.clone());
        let files = FileService::new(store.clone(), Arc::new(registry));
        for path in ["a.jpg", "b.jpg", "c.jpg"] {
            files
                .store_file(path, b"bytes", Channel::ObjectStore, None)
                .await
                .unwrap();
        }
        let tags = TagService::new(store.clone(), files.clone());
        let favorites = FavoriteService::new(store, files.clone());
        Fixture {
            executor: BatchExecutor::new(files.clone(), tags.clone(), favorites),
            files,
            tags,
            bucket,
        }
    }

    fn items(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(BatchOperation::from_action("delete", None).unwrap(), BatchOperation::Delete);
        assert_eq!(
            BatchOperation::from_action("move", Some("/dest/")).unwrap(),
            BatchOperation::Move { target: "/dest/".into() }
        );
        let err = BatchOperation::from_action("copy", Some(" ")).unwrap_err();
        assert_eq!(err.to_string(), "Target path is required for copy operation");
        assert!(matches!(
            BatchOperation::from_action("explode", None),
            Err(ManageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let f = fixture().await;
        let outcome = f
            .executor
            .run(
                &BatchOperation::Delete,
                &items(&["a.jpg", "missing.jpg", "b.jpg"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let result = outcome.result;
        assert!(!result.success);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].file, "missing.jpg");
        assert_eq!(outcome.followup.removed, items(&["a.jpg", "b.jpg"]));
        assert_eq!(f.bucket.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_move_reports_relocations_and_conflicts() {
        let f = fixture().await;
        f.files
            .store_file("dest/b.jpg", b"taken", Channel::ObjectStore, None)
            .await
            .unwrap();

        let outcome = f
            .executor
            .run(
                &BatchOperation::Move { target: "dest".into() },
                &items(&["a.jpg", "b.jpg"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.result.moves,
            vec![Relocation { from: "a.jpg".into(), to: "dest/a.jpg".into() }]
        );
        assert_eq!(outcome.result.failed_count, 1);
        assert!(f.files.exists("b.jpg").await.unwrap());
        assert_eq!(outcome.followup.moved.len(), 1);
    }

    #[tokio::test]
    async fn test_add_tags_validates_up_front() {
        let f = fixture().await;
        let err = f
            .executor
            .run(
                &BatchOperation::AddTags { tag_ids: vec!["tag_nope".into()] },
                &items(&["a.jpg"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No valid tags found");

        let tag = f
            .tags
            .create_tag(TagRequest { name: "Important".into(), color: "#F56C6C".into(), description: None })
            .await
            .unwrap();
        let outcome = f
            .executor
            .run(
                &BatchOperation::AddTags { tag_ids: vec![tag.id.clone(), "tag_nope".into()] },
                &items(&["a.jpg", "ghost.jpg"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.result.total_tags, Some(1));
        assert_eq!(outcome.result.success_count, 1);
        assert_eq!(outcome.result.failed_count, 1);
        assert_eq!(f.tags.tag_members(&tag.id).await.unwrap(), vec!["a.jpg"]);
    }

    #[tokio::test]
    async fn test_favorites_already_present_are_skipped() {
        let f = fixture().await;
        let operation = BatchOperation::AddToFavorites {
            group_id: DEFAULT_GROUP_ID.into(),
        };
        let token = CancellationToken::new();
        f.executor.run(&operation, &items(&["a.jpg"]), &token).await.unwrap();

        let outcome = f
            .executor
            .run(&operation, &items(&["a.jpg", "b.jpg"]), &token)
            .await
            .unwrap();
        assert_eq!(outcome.result.success_count, 1);
        assert_eq!(outcome.result.skipped_count, 1);
        assert!(outcome.result.success);
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_remaining_items() {
        let f = fixture().await;
        let token = CancellationToken::new();
        token.cancel();

        let outcome = f
            .executor
            .run(&BatchOperation::Delete, &items(&["a.jpg", "b.jpg"]), &token)
            .await
            .unwrap();
        assert!(outcome.result.cancelled);
        assert_eq!(outcome.result.skipped, items(&["a.jpg", "b.jpg"]));
        assert_eq!(outcome.result.success_count, 0);
        assert!(f.files.exists("a.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let f = fixture().await;
        let result = f
            .executor
            .run_with_deadline(&BatchOperation::Delete, &[], Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(ManageError::Validation(_))));
    }
}
