//! Store configuration.
//!
//! Names the physical table and its secondary indexes, and tunes the expiry
//! and batching behavior of the stores. Loading is left to the host; the
//! types deserialize from any serde format.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use grantstore_storage::{IndexSchema, TableSchema};

use crate::models::attributes;

/// Root configuration of the grant stores.
///
/// # Example (TOML)
///
/// ```toml
/// table_name = "openiddict"
/// non_valid_ttl = "5m"
/// batch_write_size = 25
///
/// [indexes]
/// subject = "Subject-index"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Physical table holding every entity kind.
    pub table_name: String,

    /// Secondary index names.
    pub indexes: IndexNames,

    /// How long a record that left the `valid` status survives before the
    /// backend may expire it.
    #[serde(with = "humantime_serde")]
    pub non_valid_ttl: Duration,

    /// Maximum number of keys per batched delete.
    pub batch_write_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: "openiddict".to_string(),
            indexes: IndexNames::default(),
            non_valid_ttl: Duration::from_secs(300), // 5 minutes
            batch_write_size: 25,
        }
    }
}

/// Names of the secondary indexes the stores query.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexNames {
    /// Hash `Subject`, range `SearchKey`.
    pub subject: String,

    /// Hash `ApplicationId`.
    pub application_id: String,

    /// Hash `AuthorizationId`, populated by tokens.
    pub authorization_id: String,
}

impl Default for IndexNames {
    fn default() -> Self {
        Self {
            subject: "Subject-index".to_string(),
            application_id: "ApplicationId-index".to_string(),
            authorization_id: "AuthorizationId-index".to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl StoreConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the table or an index is unnamed, and
    /// `ConfigError::InvalidValue` if a numeric setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.is_empty() {
            return Err(ConfigError::Missing("table_name".to_string()));
        }

        for (field, name) in [
            ("indexes.subject", &self.indexes.subject),
            ("indexes.application_id", &self.indexes.application_id),
            ("indexes.authorization_id", &self.indexes.authorization_id),
        ] {
            if name.is_empty() {
                return Err(ConfigError::Missing(field.to_string()));
            }
        }

        if self.non_valid_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "non_valid_ttl must be > 0".to_string(),
            ));
        }

        if self.batch_write_size == 0 {
            return Err(ConfigError::InvalidValue(
                "batch_write_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Table layout the stores expect the backend to provide.
    #[must_use]
    pub fn table_schema(&self) -> TableSchema {
        TableSchema::new(&self.table_name)
            .with_index(
                IndexSchema::new(&self.indexes.subject, attributes::SUBJECT)
                    .with_range(attributes::SEARCH_KEY),
            )
            .with_index(IndexSchema::new(
                &self.indexes.application_id,
                attributes::APPLICATION_ID,
            ))
            .with_index(IndexSchema::new(
                &self.indexes.authorization_id,
                attributes::AUTHORIZATION_ID,
            ))
            .with_ttl_attribute(attributes::TTL)
    }
}
