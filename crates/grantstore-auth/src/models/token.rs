//! Token records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{Document, EntityKind, new_id, parse_properties, search_key, serialize_properties};
use crate::StoreResult;
use crate::timestamp;

/// An issued token. The payload is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    id: String,

    #[serde(default)]
    concurrency_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    /// Authorization this token was issued under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    creation_date: Option<OffsetDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    expiration_date: Option<OffsetDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    redemption_date: Option<OffsetDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<String>,

    #[serde(
        rename = "TTL",
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::timestamp::option"
    )]
    ttl: Option<OffsetDateTime>,
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl Token {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: new_id(),
            concurrency_token: new_id(),
            application_id: None,
            authorization_id: None,
            subject: None,
            status: None,
            kind: None,
            reference_id: None,
            payload: None,
            creation_date: None,
            expiration_date: None,
            redemption_date: None,
            properties: None,
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    #[must_use]
    pub fn with_authorization_id(mut self, authorization_id: impl Into<String>) -> Self {
        self.authorization_id = Some(authorization_id.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn concurrency_token(&self) -> &str {
        &self.concurrency_token
    }

    pub fn ttl(&self) -> Option<OffsetDateTime> {
        self.ttl
    }

    pub(crate) fn set_ttl(&mut self, ttl: Option<OffsetDateTime>) {
        self.ttl = ttl;
    }

    pub fn creation_date(&self) -> Option<OffsetDateTime> {
        self.creation_date
    }

    pub fn set_creation_date(&mut self, date: Option<OffsetDateTime>) {
        self.creation_date = date.map(timestamp::truncate);
    }

    pub fn expiration_date(&self) -> Option<OffsetDateTime> {
        self.expiration_date
    }

    pub fn set_expiration_date(&mut self, date: Option<OffsetDateTime>) {
        self.expiration_date = date.map(timestamp::truncate);
    }

    pub fn redemption_date(&self) -> Option<OffsetDateTime> {
        self.redemption_date
    }

    pub fn set_redemption_date(&mut self, date: Option<OffsetDateTime>) {
        self.redemption_date = date.map(timestamp::truncate);
    }

    /// # Errors
    ///
    /// Returns an error if the stored text is not a JSON object.
    pub fn properties(&self) -> StoreResult<Map<String, Value>> {
        parse_properties(self.properties.as_deref())
    }

    /// # Errors
    ///
    /// Returns an error if a value cannot be serialized.
    pub fn set_properties(&mut self, properties: &Map<String, Value>) -> StoreResult<()> {
        self.properties = serialize_properties(properties)?;
        Ok(())
    }
}

impl Document for Token {
    const KIND: EntityKind = EntityKind::Token;

    fn id(&self) -> &str {
        &self.id
    }

    fn concurrency_token(&self) -> &str {
        &self.concurrency_token
    }

    fn renew_concurrency_token(&mut self) {
        self.concurrency_token = new_id();
    }

    fn search_key(&self) -> Option<String> {
        Some(search_key(
            self.application_id.as_deref(),
            self.status.as_deref(),
            self.kind.as_deref(),
        ))
    }
}
