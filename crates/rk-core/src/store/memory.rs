//! In-memory configuration store

use dashmap::DashMap;
use serde_json::Value;

use super::ConfigStore;
use crate::error::ConfigError;
use crate::secret::Secret;

/// Configuration store that lives only for the lifetime of the process
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, Value>,
    secrets: DashMap<String, Secret>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        if value.is_null() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.values.remove(key);
        Ok(())
    }

    fn get_secret(&self, key: &str) -> Option<Secret> {
        self.secrets.get(key).map(|s| s.value().clone())
    }

    fn set_secret(&self, key: &str, secret: &Secret) -> Result<(), ConfigError> {
        self.secrets.insert(key.to_string(), secret.clone());
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn clear(&self) -> Result<(), ConfigError> {
        self.values.clear();
        self.secrets.clear();
        Ok(())
    }
}
