//! In-memory document-store backend for grantstore.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `grantstore-storage`, intended for tests and local development.
//!
//! # Example
//!
//! ```ignore
//! use grantstore_db_memory::InMemoryDocumentStore;
//! use grantstore_storage::{DocumentStore, IndexSchema, TableSchema};
//!
//! let schema = TableSchema::new("grants")
//!     .with_index(IndexSchema::new("Subject-index", "Subject").with_range("SearchKey"))
//!     .with_ttl_attribute("TTL");
//! let store = InMemoryDocumentStore::new(schema);
//! let item = store.get_item(&key).await?;
//! ```

mod query;
pub mod storage;

pub use grantstore_storage::{DocumentStore, StorageError};
pub use storage::{DEFAULT_PAGE_SIZE, InMemoryDocumentStore, MAX_BATCH_DELETE, StorageOptions};

/// Creates a shareable in-memory store for the given table layout.
pub fn create_document_store(
    schema: grantstore_storage::TableSchema,
) -> grantstore_storage::DynDocumentStore {
    std::sync::Arc::new(InMemoryDocumentStore::new(schema))
}
