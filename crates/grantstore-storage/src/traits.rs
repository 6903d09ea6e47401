//! The document-store trait every backend implements.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{Item, PrimaryKey, PutCondition, QueryPage, QueryRequest};

/// A partition/sort-key document store with secondary indexes.
///
/// Implementations must be thread-safe (`Send + Sync`). Calls are single
/// network round trips; none of them retry.
///
/// # Example
///
/// ```ignore
/// use grantstore_storage::{DocumentStore, KeyCondition, QueryRequest, StorageError};
///
/// async fn first_page(store: &dyn DocumentStore) -> Result<usize, StorageError> {
///     let request = QueryRequest::table(KeyCondition::hash("TOKEN").begins_with("#TOKEN#"));
///     Ok(store.query(&request).await?.items.len())
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one item by its exact primary key.
    ///
    /// Returns `None` if no item has that key.
    async fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>, StorageError>;

    /// Fetches one page of a query against the table or a secondary index.
    ///
    /// Pages come back in key order of the queried structure; `QueryPage::next`
    /// is set while more pages remain.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRequest` if the request names an index
    /// the table does not declare.
    async fn query(&self, request: &QueryRequest) -> Result<QueryPage, StorageError>;

    /// Writes a full item, replacing any item with the same key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionFailed` if `condition` is given and does
    /// not hold for the currently stored item.
    async fn put_item(
        &self,
        item: Item,
        condition: Option<PutCondition>,
    ) -> Result<(), StorageError>;

    /// Deletes one item. Deleting a missing item succeeds.
    async fn delete_item(&self, key: &PrimaryKey) -> Result<(), StorageError>;

    /// Deletes several items in one call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRequest` if the batch exceeds the
    /// backend's per-call limit.
    async fn batch_delete(&self, keys: &[PrimaryKey]) -> Result<(), StorageError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
