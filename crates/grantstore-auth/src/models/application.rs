//! Client application registrations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Document, EntityKind, new_id, parse_properties, serialize_properties};
use crate::StoreResult;

/// A registered OAuth/OIDC client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Application {
    id: String,

    #[serde(default)]
    concurrency_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Localized display names keyed by culture.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub display_names: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_logout_redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,

    /// Client type, e.g. `public` or `confidential`.
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,

    /// Raw JSON Web Key Set text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_web_key_set: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<String>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: new_id(),
            concurrency_token: new_id(),
            client_id: None,
            client_secret: None,
            consent_type: None,
            display_name: None,
            display_names: BTreeMap::new(),
            permissions: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            redirect_uris: Vec::new(),
            requirements: Vec::new(),
            kind: None,
            application_type: None,
            settings: BTreeMap::new(),
            json_web_key_set: None,
            properties: None,
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn concurrency_token(&self) -> &str {
        &self.concurrency_token
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

impl Document for Application {
    const KIND: EntityKind = EntityKind::Application;

    fn id(&self) -> &str {
        &self.id
    }

    fn concurrency_token(&self) -> &str {
        &self.concurrency_token
    }

    fn renew_concurrency_token(&mut self) {
        self.concurrency_token = new_id();
    }
}
