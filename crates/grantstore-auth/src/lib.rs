//! Single-table persistence for OAuth/OIDC grants.
//!
//! Stores applications, authorizations and tokens in one partition/sort-key
//! document table behind a [`DocumentStore`]:
//!
//! - Authorizations, with lookups by subject, client, status, type and
//!   scopes, offset listing, optimistic-concurrency updates and pruning
//! - Tokens, looked up by authorization, application or subject
//! - Applications
//! - Advisory per-kind counters
//!
//! # Example
//!
//! ```ignore
//! use grantstore_auth::{GrantStore, StoreConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = StoreConfig::default();
//! let backend = grantstore_db_memory::create_document_store(config.table_schema());
//! let grants = GrantStore::new(backend, config)?;
//!
//! let authorizations = grants.authorizations();
//! let valid = authorizations.find_with_status("alice", "app1", "valid", CancellationToken::new())?;
//! ```

pub mod application;
pub mod authorization;
pub mod config;
pub mod counter;
pub mod cursor;
pub mod models;
pub mod table;
pub mod timestamp;
pub mod token;

use std::sync::Arc;

use grantstore_storage::{DynDocumentStore, StorageError};

pub use application::ApplicationStore;
pub use authorization::AuthorizationStore;
pub use config::{ConfigError, IndexNames, StoreConfig};
pub use counter::CounterService;
pub use cursor::CursorMap;
pub use models::{Application, Authorization, Document, EntityKind, Token};
pub use token::TokenStore;

pub use grantstore_storage::DocumentStore;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during grant store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document store rejected or failed the operation.
    #[error("Backend error: {0}")]
    Backend(#[from] StorageError),

    /// A record or property bag could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required argument was empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The record to update does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller's copy of the record is stale.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested query shape cannot be served.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The operation observed cancellation before completing.
    #[error("Operation cancelled")]
    Cancelled,
}

impl StoreError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a `NotSupported` error.
    #[must_use]
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is an `InvalidInput` error.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a `NotSupported` error.
    #[must_use]
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }

    /// Returns `true` if this is a `Cancelled` error.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the backend reported a transient failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(err) if err.is_transient())
    }

    /// Returns `true` if this is a caller error rather than an infrastructure one.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::NotFound(_) | Self::Conflict(_) | Self::NotSupported(_)
        )
    }
}

/// Type alias for store operation results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Fails with `InvalidInput` when a required argument is empty.
pub(crate) fn require(name: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::invalid_input(format!("{name} cannot be empty")));
    }
    Ok(())
}

// =============================================================================
// Grant Store
// =============================================================================

/// Entry point bundling the per-kind stores over one backend.
///
/// Cloning is cheap; clones share the backend, configuration and the
/// authorization cursor map.
#[derive(Clone)]
pub struct GrantStore {
    store: DynDocumentStore,
    config: Arc<StoreConfig>,
    cursors: Arc<CursorMap>,
}

impl GrantStore {
    /// Creates the stores after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(store: DynDocumentStore, config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            config: Arc::new(config),
            cursors: Arc::new(CursorMap::new()),
        })
    }

    /// Get authorization storage.
    #[must_use]
    pub fn authorizations(&self) -> AuthorizationStore {
        AuthorizationStore::new(
            self.store.clone(),
            self.config.clone(),
            self.cursors.clone(),
        )
    }

    /// Get token storage.
    #[must_use]
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.store.clone(), self.config.clone())
    }

    /// Get application storage.
    #[must_use]
    pub fn applications(&self) -> ApplicationStore {
        ApplicationStore::new(self.store.clone())
    }

    /// Get the entity counters.
    #[must_use]
    pub fn counters(&self) -> CounterService {
        CounterService::new(self.store.clone())
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}
