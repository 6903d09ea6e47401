//! # grantstore-storage
//!
//! Document-store contract for grantstore.
//!
//! This crate defines what the authorization and token stores need from a
//! single-table, partition/sort-key document store: exact-key reads, paged
//! key-condition queries against the table or a secondary index, full-item
//! (optionally conditional) puts, single and batched deletes, and an
//! attribute TTL declared in the [`TableSchema`]. It does not contain any
//! implementations.
//!
//! ## Example
//!
//! ```ignore
//! use grantstore_storage::{DocumentStore, KeyCondition, QueryRequest};
//!
//! let request = QueryRequest::index("Subject-index", KeyCondition::hash("alice")
//!     .begins_with("APPLICATION#app1#STATUS#valid"));
//! let page = store.query(&request).await?;
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::DocumentStore;
pub use types::{
    ContinuationToken, Filter, IndexSchema, Item, KeyCondition, PrimaryKey, PutCondition,
    QueryPage, QueryRequest, RangeCondition, TableSchema, string_attribute,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable document store.
pub type DynDocumentStore = std::sync::Arc<dyn DocumentStore>;
