//! Persisted entity types and their single-table layout.
//!
//! Every entity kind lives under its own fixed partition key, with sort keys
//! built from a kind-specific prefix and the record id. Derived key attributes
//! (`PartitionKey`, `SortKey`, `SearchKey`) are computed in
//! [`Document::to_item`] and never held on the structs.

mod application;
mod authorization;
mod token;

pub use application::Application;
pub use authorization::Authorization;
pub use token::Token;

use std::fmt;

use grantstore_storage::{Item, PrimaryKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{StoreError, StoreResult, timestamp};

// =============================================================================
// Well-known values
// =============================================================================

/// Attribute names shared by the stores and the table schema.
pub mod attributes {
    pub const PARTITION_KEY: &str = "PartitionKey";
    pub const SORT_KEY: &str = "SortKey";
    pub const SEARCH_KEY: &str = "SearchKey";
    pub const APPLICATION_ID: &str = "ApplicationId";
    pub const AUTHORIZATION_ID: &str = "AuthorizationId";
    pub const SUBJECT: &str = "Subject";
    pub const CREATION_DATE: &str = "CreationDate";
    pub const CONCURRENCY_TOKEN: &str = "ConcurrencyToken";
    pub const TTL: &str = "TTL";
    pub const KIND: &str = "Kind";
    pub const COUNT: &str = "Count";
}

/// Authorization and token statuses.
pub mod statuses {
    pub const VALID: &str = "valid";
    pub const INACTIVE: &str = "inactive";
    pub const REVOKED: &str = "revoked";
    pub const REDEEMED: &str = "redeemed";
    pub const REJECTED: &str = "rejected";
}

/// Authorization types.
pub mod authorization_types {
    /// One-off grant, pruned once no token references it.
    pub const AD_HOC: &str = "ad-hoc";
    pub const PERMANENT: &str = "permanent";
}

// =============================================================================
// Entity Kind
// =============================================================================

/// The record kinds sharing the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Application,
    Authorization,
    Token,
}

impl EntityKind {
    /// Fixed partition key holding every record of this kind.
    #[must_use]
    pub fn partition_key(&self) -> &'static str {
        match self {
            Self::Application => "APPLICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Token => "TOKEN",
        }
    }

    /// Prefix of every sort key of this kind.
    #[must_use]
    pub fn sort_key_prefix(&self) -> &'static str {
        match self {
            Self::Application => "APPLICATION#",
            Self::Authorization => "#AUTHORIZATION#",
            Self::Token => "#TOKEN#",
        }
    }

    /// Primary key of the record with the given id.
    #[must_use]
    pub fn key(&self, id: &str) -> PrimaryKey {
        PrimaryKey::new(
            self.partition_key(),
            format!("{}{id}", self.sort_key_prefix()),
        )
    }

    /// Name used in counter records and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.partition_key()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Document
// =============================================================================

/// A record persisted as one item of the shared table.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn concurrency_token(&self) -> &str;

    /// Stamps a fresh concurrency token.
    fn renew_concurrency_token(&mut self);

    /// Composite lookup key for the subject index, for kinds that have one.
    fn search_key(&self) -> Option<String> {
        None
    }

    fn key(&self) -> PrimaryKey {
        Self::KIND.key(self.id())
    }

    /// Serializes the record and adds its derived key attributes.
    fn to_item(&self) -> StoreResult<Item> {
        let Value::Object(mut item) = serde_json::to_value(self)? else {
            return Err(StoreError::invalid_input(format!(
                "{} record did not serialize to an object",
                Self::KIND
            )));
        };
        let key = self.key();
        item.insert(
            attributes::PARTITION_KEY.to_string(),
            Value::String(key.partition_key),
        );
        item.insert(attributes::SORT_KEY.to_string(), Value::String(key.sort_key));
        if let Some(search_key) = self.search_key() {
            item.insert(
                attributes::SEARCH_KEY.to_string(),
                Value::String(search_key),
            );
        }
        Ok(item)
    }

    /// Reads a record back, ignoring the derived key attributes.
    fn from_item(item: Item) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(item))?)
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `APPLICATION#{application}#STATUS#{status}#TYPE#{kind}`, absent parts empty.
pub(crate) fn search_key(
    application_id: Option<&str>,
    status: Option<&str>,
    kind: Option<&str>,
) -> String {
    format!(
        "APPLICATION#{}#STATUS#{}#TYPE#{}",
        application_id.unwrap_or_default(),
        status.unwrap_or_default(),
        kind.unwrap_or_default()
    )
}

/// Expiry stamped on update: records leaving the `valid` status self-expire.
///
/// Whole seconds only, matching the stored epoch-second `TTL`.
pub(crate) fn expiry_for_status(
    status: Option<&str>,
    non_valid_ttl: std::time::Duration,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    match status {
        Some(statuses::VALID) => None,
        _ => Some(timestamp::truncate_seconds(now + non_valid_ttl)),
    }
}

pub(crate) fn parse_properties(text: Option<&str>) -> StoreResult<Map<String, Value>> {
    match text {
        None | Some("") => Ok(Map::new()),
        Some(text) => Ok(serde_json::from_str(text)?),
    }
}

pub(crate) fn serialize_properties(properties: &Map<String, Value>) -> StoreResult<Option<String>> {
    if properties.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(properties)?))
}

/// Keeps the first occurrence of each value, in order.
pub(crate) fn dedupe<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.into();
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
