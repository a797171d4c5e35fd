//! Authenticated request sessions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identity of the caller of one request.
///
/// Sessions are produced by a session resolver from request headers, are
/// read-only for the duration of the request and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    user_id: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

impl Session {
    /// Creates a session for a user.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a free-form attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the user identifier.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
}
