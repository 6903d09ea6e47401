//! Authorization records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{Document, EntityKind, dedupe, new_id, parse_properties, search_key, serialize_properties};
use crate::StoreResult;
use crate::timestamp;

/// A grant of scopes by a subject to a client application.
///
/// Plain attributes are public. The id and concurrency token are generated
/// on construction and read-only; the store renews the token on every
/// successful update and manages the expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authorization {
    id: String,

    #[serde(default)]
    concurrency_token: String,

    /// Id of the application the grant was made to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    /// Resource owner that granted the authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// One of [`statuses`](super::statuses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// One of [`authorization_types`](super::authorization_types).
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    scopes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    creation_date: Option<OffsetDateTime>,

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

impl Default for Authorization {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorization {
    /// Creates an empty authorization with fresh identifiers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: new_id(),
            concurrency_token: new_id(),
            application_id: None,
            subject: None,
            status: None,
            kind: None,
            scopes: Vec::new(),
            creation_date: None,
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

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_scopes(scopes);
        self
    }

    #[must_use]
    pub fn with_creation_date(mut self, creation_date: OffsetDateTime) -> Self {
        self.set_creation_date(Some(creation_date));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn concurrency_token(&self) -> &str {
        &self.concurrency_token
    }

    /// When the backend may expire this record, if scheduled.
    pub fn ttl(&self) -> Option<OffsetDateTime> {
        self.ttl
    }

    pub(crate) fn set_ttl(&mut self, ttl: Option<OffsetDateTime>) {
        self.ttl = ttl;
    }

    pub fn creation_date(&self) -> Option<OffsetDateTime> {
        self.creation_date
    }

    /// Sets the creation date, normalized to UTC and whole milliseconds.
    pub fn set_creation_date(&mut self, creation_date: Option<OffsetDateTime>) {
        self.creation_date = creation_date.map(timestamp::truncate);
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Replaces the scopes, dropping duplicates.
    pub fn set_scopes<I, S>(&mut self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = dedupe(scopes);
    }

    /// Returns `true` if every given scope was granted.
    pub fn has_scopes<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope.as_ref()))
    }

    /// Decodes the property bag.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored text is not a JSON object.
    pub fn properties(&self) -> StoreResult<Map<String, Value>> {
        parse_properties(self.properties.as_deref())
    }

    /// Replaces the property bag. An empty bag is not persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be serialized.
    pub fn set_properties(&mut self, properties: &Map<String, Value>) -> StoreResult<()> {
        self.properties = serialize_properties(properties)?;
        Ok(())
    }
}

impl Document for Authorization {
    const KIND: EntityKind = EntityKind::Authorization;

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
