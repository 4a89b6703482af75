//! Node-issued credentials
//!
//! Credentials are an opaque JSON object as far as the broker is concerned,
//! except for a handful of well-known keys: `name` (the instance the
//! credentials belong to), `node_id` (the owning node) and `user`/`username`
//! (the binding identity).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NAME: &str = "name";
pub const NODE_ID: &str = "node_id";
pub const USER: &str = "user";
pub const USERNAME: &str = "username";

/// Opaque credential map with typed accessors for the well-known keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Instance name these credentials refer to
    pub fn name(&self) -> Option<&str> {
        self.get_str(NAME)
    }

    /// Node that owns the instance
    pub fn node_id(&self) -> Option<&str> {
        self.get_str(NODE_ID)
    }

    /// Binding user, whichever of `user`/`username` the driver emits
    pub fn user(&self) -> Option<&str> {
        self.get_str(USER).or_else(|| self.get_str(USERNAME))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` over `self`; keys in `other` win
    pub fn merge(&mut self, other: &Credentials) {
        for (key, value) in other.0.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Whether both maps describe the same binding.
    ///
    /// Bindings are identified by instance name plus user. When neither side
    /// carries a user the maps must be equal.
    pub fn same_binding(&self, other: &Credentials) -> bool {
        if self.name() != other.name() {
            return false;
        }
        match (self.user(), other.user()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self == other,
            _ => false,
        }
    }
}

impl From<Map<String, Value>> for Credentials {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_accessors() {
        let creds = Credentials::new()
            .with(NAME, "db-1")
            .with(NODE_ID, "node-a")
            .with(USERNAME, "u1");
        assert_eq!(creds.name(), Some("db-1"));
        assert_eq!(creds.node_id(), Some("node-a"));
        assert_eq!(creds.user(), Some("u1"));
    }

    #[test]
    fn test_same_binding_by_user() {
        let a = Credentials::new().with(NAME, "db-1").with(USER, "u1").with("password", "x");
        let b = Credentials::new().with(NAME, "db-1").with(USERNAME, "u1");
        let c = Credentials::new().with(NAME, "db-1").with(USER, "u2");
        assert!(a.same_binding(&b));
        assert!(!a.same_binding(&c));
    }

    #[test]
    fn test_same_binding_without_user_requires_equality() {
        let a = Credentials::new().with(NAME, "db-1").with("token", "t");
        let b = Credentials::new().with(NAME, "db-1").with("token", "t");
        let c = Credentials::new().with(NAME, "db-1").with("token", "other");
        assert!(a.same_binding(&b));
        assert!(!a.same_binding(&c));
    }

    #[test]
    fn test_transparent_serialization() {
        let creds = Credentials::new().with(NAME, "db-1");
        let json = serde_json::to_string(&creds).unwrap();
        assert_eq!(json, r#"{"name":"db-1"}"#);
    }
}
