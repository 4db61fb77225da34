//! Metadata record store
//!
//! Every file record and every secondary index lives in one flat key space of
//! `key -> (value, metadata)` entries. Keys are namespaced with `@` (see
//! [`keys`]); file records are keyed by their full path.
//!
//! # Consistency contract
//!
//! Implementations guarantee atomicity for a single key only. There is no
//! multi-key transaction, no locking and no optimistic-concurrency token.
//! A write made by one request is not guaranteed to be visible to a read made
//! concurrently by another request. Callers that keep two keys in sync (the
//! bidirectional indices) do so with sequential writes and must tolerate the
//! two sides diverging if a request dies between them.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub mod keys;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryMetadataStore;
pub use sqlite::SqliteMetadataStore;

/// Page size used when a caller does not ask for one
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Highest index record version this build understands
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("metadata store backend error: {0}")]
    Backend(String),

    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record at {key} has version {found}, newest supported is {supported}")]
    UnsupportedVersion { key: String, found: u32, supported: u32 },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A raw entry as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub value: String,
    pub metadata: Option<Value>,
}

/// A key returned by a listing, with its metadata but without its value
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub name: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: String,
    /// Exclusive lower bound, as returned in [`ListPage::cursor`]
    pub cursor: Option<String>,
    /// Zero means [`DEFAULT_LIST_LIMIT`]
    pub limit: usize,
}

impl ListOptions {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub(crate) fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIST_LIMIT
        } else {
            self.limit
        }
    }
}

/// One page of a key listing, in ascending key order
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<KeyEntry>,
    /// Present when more keys match; pass it back to continue
    pub cursor: Option<String>,
}

/// Repository interface over the flat key space
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>>;

    /// Insert or overwrite a key
    async fn put(&self, key: &str, value: &str, metadata: Option<&Value>) -> StoreResult<()>;

    /// Delete a key; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn list(&self, options: &ListOptions) -> StoreResult<ListPage>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Index blobs carry a schema version so that old deployments can be read and
/// newer blobs are rejected instead of misread.
pub trait VersionedRecord {
    fn version(&self) -> u32;
}

/// Typed access on top of [`MetadataStore`]
#[async_trait]
pub trait MetadataStoreExt: MetadataStore {
    /// Read a JSON value blob. A blob that does not deserialize into `T` is an
    /// error, never an empty default.
    async fn get_json<T>(&self, key: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(entry) => serde_json::from_str(&entry.value)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Read a versioned index record, validating its version
    async fn get_record<T>(&self, key: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + VersionedRecord + Send,
    {
        let record: Option<T> = self.get_json(key).await?;
        if let Some(found) = record.as_ref().map(|r| r.version()) {
            if found > RECORD_VERSION {
                return Err(StoreError::UnsupportedVersion {
                    key: key.to_string(),
                    found,
                    supported: RECORD_VERSION,
                });
            }
        }
        Ok(record)
    }

    async fn put_json<T>(&self, key: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_string(value).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        self.put(key, &body, None).await
    }

    /// Follow cursors until every key under `prefix` has been listed
    async fn list_all(&self, prefix: &str) -> StoreResult<Vec<KeyEntry>> {
        let mut options = ListOptions::prefix(prefix);
        let mut keys = Vec::new();
        loop {
            let page = self.list(&options).await?;
            keys.extend(page.keys);
            match page.cursor {
                Some(cursor) => options.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(keys)
    }
}

impl<S: MetadataStore + ?Sized> MetadataStoreExt for S {}

/// Open the store named by a `METADATA_STORE_URL` value (`memory` or a sqlite URL)
pub async fn connect(url: &str) -> StoreResult<std::sync::Arc<dyn MetadataStore>> {
    if url == "memory" || url == "memory:" {
        tracing::warn!("Using the in-memory metadata store; records are lost on restart");
        return Ok(std::sync::Arc::new(MemoryMetadataStore::new()));
    }
    if url.starts_with("sqlite:") {
        let store = SqliteMetadataStore::connect(url).await?;
        return Ok(std::sync::Arc::new(store));
    }
    Err(StoreError::Backend(format!(
        "unsupported metadata store URL '{}' (expected 'memory' or 'sqlite:...')",
        url
    )))
}
