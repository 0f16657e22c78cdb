//! Server-side session state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A server-side session: an identifier, a creation timestamp, and a bag
/// of named attributes.
///
/// Sessions are plain values. Mutating a copy changes nothing in the store
/// until it is written back through
/// [`SessionStore::flush`](crate::store::SessionStore::flush) or
/// [`SessionStore::store_session`](crate::store::SessionStore::store_session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    attributes: HashMap<String, Value>,
}

impl Session {
    /// Create an empty session with the given identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), created_at: Utc::now(), attributes: HashMap::new() }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time of this session.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Read an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set an attribute, replacing any previous value under the name.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Remove an attribute, returning the previous value if any.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// All attributes of this session.
    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }
}
