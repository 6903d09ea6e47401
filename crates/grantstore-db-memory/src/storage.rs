use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use grantstore_storage::{
    DocumentStore, Item, PrimaryKey, PutCondition, QueryPage, QueryRequest, StorageError,
    TableSchema,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::query::run_query;

/// Per-call batch limit, matching the hosted service this backend stands in for.
pub const MAX_BATCH_DELETE: usize = 25;

/// Default maximum number of items evaluated per query page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Behavioral knobs for the in-memory backend.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Maximum items evaluated per query page. Small values exercise paging.
    pub page_size: usize,
    /// Maximum keys accepted by one `batch_delete` call.
    pub max_batch_delete: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_batch_delete: MAX_BATCH_DELETE,
        }
    }
}

/// In-memory document store keyed by `(PartitionKey, SortKey)`.
///
/// This backend provides:
/// - Ordered partitions so prefix scans walk sort keys in order
/// - Secondary index emulation for the indexes declared in the schema
/// - Paged queries with continuation tokens
/// - Conditional puts and size-limited batch deletes
/// - TTL: items whose TTL attribute (epoch seconds) has passed are invisible
///   and removed by [`purge_expired`](Self::purge_expired)
///
/// Clones share the same data.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    schema: Arc<TableSchema>,
    data: Arc<RwLock<BTreeMap<PrimaryKey, Item>>>,
    options: StorageOptions,
}

impl InMemoryDocumentStore {
    /// Creates an empty store for the given table layout.
    pub fn new(schema: TableSchema) -> Self {
        Self::with_options(schema, StorageOptions::default())
    }

    /// Creates an empty store with explicit options.
    pub fn with_options(schema: TableSchema, options: StorageOptions) -> Self {
        Self {
            schema: Arc::new(schema),
            data: Arc::new(RwLock::new(BTreeMap::new())),
            options,
        }
    }

    /// Table layout this store serves.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Number of live (non-expired) items.
    pub async fn len(&self) -> usize {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let guard = self.data.read().await;
        guard.values().filter(|item| !self.is_expired(item, now)).count()
    }

    /// Returns `true` if the store holds no live items.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Physically removes every item whose TTL has passed.
    ///
    /// Returns the number of removed items.
    pub async fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut guard = self.data.write().await;
        let before = guard.len();
        guard.retain(|_, item| !self.is_expired(item, now));
        before - guard.len()
    }

    fn is_expired(&self, item: &Item, now: i64) -> bool {
        self.schema
            .ttl_attribute
            .as_ref()
            .and_then(|attribute| item.get(attribute))
            .and_then(serde_json::Value::as_i64)
            .is_some_and(|expires_at| expires_at <= now)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>, StorageError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let guard = self.data.read().await;
        Ok(guard
            .get(key)
            .filter(|item| !self.is_expired(item, now))
            .cloned())
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryPage, StorageError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let guard = self.data.read().await;
        run_query(
            &self.schema,
            &guard,
            request,
            self.options.page_size.max(1),
            |item| !self.is_expired(item, now),
        )
    }

    async fn put_item(
        &self,
        item: Item,
        condition: Option<PutCondition>,
    ) -> Result<(), StorageError> {
        let key = self.schema.key_of(&item).ok_or_else(|| {
            StorageError::invalid_request(format!(
                "item is missing {} or {}",
                self.schema.partition_key_attribute, self.schema.sort_key_attribute
            ))
        })?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut guard = self.data.write().await;
        let existing = guard.get(&key).filter(|item| !self.is_expired(item, now));

        match condition {
            Some(PutCondition::AttributeEquals(attribute, expected)) => {
                if existing.and_then(|current| current.get(&attribute)) != Some(&expected) {
                    return Err(StorageError::condition_failed(format!(
                        "{attribute} of {}/{} does not match",
                        key.partition_key, key.sort_key
                    )));
                }
            }
            Some(PutCondition::NotExists) => {
                if existing.is_some() {
                    return Err(StorageError::condition_failed(format!(
                        "{}/{} already exists",
                        key.partition_key, key.sort_key
                    )));
                }
            }
            None => {}
        }

        guard.insert(key, item);
        Ok(())
    }

    async fn delete_item(&self, key: &PrimaryKey) -> Result<(), StorageError> {
        let mut guard = self.data.write().await;
        guard.remove(key);
        Ok(())
    }

    async fn batch_delete(&self, keys: &[PrimaryKey]) -> Result<(), StorageError> {
        if keys.len() > self.options.max_batch_delete {
            return Err(StorageError::invalid_request(format!(
                "batch of {} keys exceeds the limit of {}",
                keys.len(),
                self.options.max_batch_delete
            )));
        }

        let mut guard = self.data.write().await;
        for key in keys {
            guard.remove(key);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
