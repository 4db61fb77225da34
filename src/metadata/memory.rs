//! In-memory metadata store, used by tests and the `memory` store URL

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use super::{KeyEntry, ListOptions, ListPage, MetadataStore, StoreResult, StoredEntry};

#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str, metadata: Option<&Value>) -> StoreResult<()> {
        let entry = StoredEntry {
            value: value.to_string(),
            metadata: metadata.cloned(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ListPage> {
        let limit = options.effective_limit();
        let prefix = options.prefix.as_str();

        let lower = match &options.cursor {
            Some(cursor) if cursor.as_str() >= prefix => Bound::Excluded(cursor.clone()),
            _ => Bound::Included(prefix.to_string()),
        };

        let entries = self.entries.read().await;
        let mut keys = Vec::new();
        let mut more = false;
        for (name, entry) in entries.range::<String, _>((lower, Bound::Unbounded)) {
            if !name.starts_with(prefix) {
                break;
            }
            if keys.len() == limit {
                more = true;
                break;
            }
            keys.push(KeyEntry {
                name: name.clone(),
                metadata: entry.metadata.clone(),
            });
        }

        let cursor = if more {
            keys.last().map(|k| k.name.clone())
        } else {
            None
        };
        Ok(ListPage { keys, cursor })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataStoreExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryMetadataStore::new();
        let meta = json!({"FileName": "a.jpg"});
        store.put("a.jpg", "", Some(&meta)).await.unwrap();

        let entry = store.get("a.jpg").await.unwrap().unwrap();
        assert_eq!(entry.value, "");
        assert_eq!(entry.metadata, Some(meta));

        store.delete("a.jpg").await.unwrap();
        assert!(store.get("a.jpg").await.unwrap().is_none());
        // deleting twice is fine
        store.delete("a.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix_with_cursor() {
        let store = MemoryMetadataStore::new();
        for key in ["a/1", "a/2", "a/3", "b/1", "manage@x"] {
            store.put(key, "", None).await.unwrap();
        }

        let first = store
            .list(&ListOptions {
                prefix: "a/".into(),
                cursor: None,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(first.keys.len(), 2);
        assert_eq!(first.cursor.as_deref(), Some("a/2"));

        let second = store
            .list(&ListOptions {
                prefix: "a/".into(),
                cursor: first.cursor,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(second.keys.len(), 1);
        assert_eq!(second.keys[0].name, "a/3");
        assert!(second.cursor.is_none());

        let all = store.list_all("").await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_get_json_rejects_malformed_blob() {
        let store = MemoryMetadataStore::new();
        store.put("manage@tags@index", "not json", None).await.unwrap();
        let result: StoreResult<Option<Vec<String>>> = store.get_json("manage@tags@index").await;
        assert!(matches!(result, Err(crate::metadata::StoreError::Corrupt { .. })));
    }
}
