//! Configuration store
//!
//! Server settings live in a flat key/value store keyed by path strings
//! such as `"{config_id}/auth_method"` or
//! `"{config_id}/password_login/address"`. Passwords and passphrases are
//! kept apart from ordinary values and are only reachable through the
//! `*_secret` methods.
//!
//! The store is handed to its users as an `Arc<dyn ConfigStore>` rather than
//! living in a process-wide global, so tests can pass their own instance.

mod defaults;
mod file;
mod memory;

pub use defaults::{DefaultsProvider, DefaultsRegistry, PROVIDER_CONFIGURATION_KEY};
pub use file::FileStore;
pub use memory::MemoryStore;

use serde_json::Value;

use crate::error::ConfigError;
use crate::secret::Secret;
use crate::types::{AuthMethod, ServerId};

/// Key holding the map of configured servers
pub const SERVERS_KEY: &str = "servers";

/// Key/value configuration store with a separate secret area
pub trait ConfigStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value. Writing `Value::Null` removes the key.
    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError>;

    /// Remove a value
    fn remove(&self, key: &str) -> Result<(), ConfigError>;

    /// Read a secret
    fn get_secret(&self, key: &str) -> Option<Secret>;

    /// Write a secret
    fn set_secret(&self, key: &str, secret: &Secret) -> Result<(), ConfigError>;

    /// All non-secret keys currently set
    fn keys(&self) -> Vec<String>;

    /// Remove every value and secret
    fn clear(&self) -> Result<(), ConfigError>;

    /// Read a value, falling back to `default` when unset
    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Read a scalar as a string. Numbers and booleans are rendered.
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// `"{id}/{field}"`
pub fn server_key(id: &ServerId, field: &str) -> String {
    format!("{}/{}", id, field)
}

/// `"{id}/{method}/{field}"`
pub fn method_key(id: &ServerId, method: AuthMethod, field: &str) -> String {
    format!("{}/{}/{}", id, method, field)
}

/// Ids of all configured servers, in the store's order
pub fn server_ids(store: &dyn ConfigStore) -> Vec<ServerId> {
    match store.get(SERVERS_KEY) {
        Some(Value::Object(servers)) => servers.keys().map(|k| ServerId::new(k.as_str())).collect(),
        _ => Vec::new(),
    }
}

/// Read the authentication method configured for a server
pub fn auth_method(store: &dyn ConfigStore, id: &ServerId) -> Result<AuthMethod, ConfigError> {
    let key = server_key(id, "auth_method");
    match store.get(&key) {
        Some(Value::String(s)) => s.parse(),
        Some(_) => Err(ConfigError::UnexpectedType {
            key,
            expected: "string",
        }),
        None => Err(ConfigError::MissingField(key)),
    }
}

/// Read a required scalar field rendered as a string
pub fn require_string(store: &dyn ConfigStore, key: &str) -> Result<String, ConfigError> {
    store
        .get_string(key)
        .ok_or_else(|| ConfigError::MissingField(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_helpers() {
        let id = ServerId::new("srv");
        assert_eq!(server_key(&id, "status"), "srv/status");
        assert_eq!(
            method_key(&id, AuthMethod::KeyFile, "keyfile"),
            "srv/keyfile_login/keyfile"
        );
    }

    #[test]
    fn test_server_ids() {
        let store = MemoryStore::new();
        assert!(server_ids(&store).is_empty());

        store
            .set(SERVERS_KEY, json!({"a": {}, "b": {}}))
            .unwrap();
        let ids = server_ids(&store);
        assert_eq!(ids, vec![ServerId::new("a"), ServerId::new("b")]);
    }

    #[test]
    fn test_auth_method_lookup() {
        let store = MemoryStore::new();
        let id = ServerId::new("srv");

        assert!(matches!(
            auth_method(&store, &id),
            Err(ConfigError::MissingField(_))
        ));

        store.set("srv/auth_method", json!("password_login")).unwrap();
        assert_eq!(auth_method(&store, &id).unwrap(), AuthMethod::Password);

        store.set("srv/auth_method", json!(3)).unwrap();
        assert!(matches!(
            auth_method(&store, &id),
            Err(ConfigError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn test_get_string_renders_numbers() {
        let store = MemoryStore::new();
        store.set("srv/password_login/port", json!(2222)).unwrap();
        assert_eq!(
            store.get_string("srv/password_login/port").as_deref(),
            Some("2222")
        );
        assert_eq!(require_string(&store, "missing").unwrap_err().to_string(), "Missing required field: missing");
    }
}
