//! TOML-file backed configuration store
//!
//! Ordinary values are written to the store file on every change. Secrets
//! go to a sibling `*.secrets.toml` file which, on Unix, is created with
//! mode `0600`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;

use super::ConfigStore;
use crate::config;
use crate::error::ConfigError;
use crate::secret::Secret;

/// Configuration store persisted to disk
pub struct FileStore {
    path: PathBuf,
    secrets_path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
    secrets: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open a store, loading existing contents if the files exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let secrets_path = path.with_extension("secrets.toml");

        let values = if path.exists() {
            config::load_config(&path)?
        } else {
            BTreeMap::new()
        };
        let secrets = if secrets_path.exists() {
            config::load_config(&secrets_path)?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(
            "Opened config store {:?} ({} values, {} secrets)",
            path,
            values.len(),
            secrets.len()
        );

        Ok(Self {
            path,
            secrets_path,
            values: RwLock::new(values),
            secrets: RwLock::new(secrets),
        })
    }

    /// Path of the values file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_values(&self, values: &BTreeMap<String, Value>) -> Result<(), ConfigError> {
        config::save_config(&self.path, values)
    }

    fn flush_secrets(&self, secrets: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(secrets)?;
        if let Some(parent) = self.secrets_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.secrets_path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let mut next = values.clone();
        if value.is_null() {
            next.remove(key);
        } else {
            next.insert(key.to_string(), value);
        }
        // Only commit what made it to disk
        self.flush_values(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.flush_values(&next)?;
        *values = next;
        Ok(())
    }

    fn get_secret(&self, key: &str) -> Option<Secret> {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        secrets.get(key).map(|s| Secret::new(s.as_str()))
    }

    fn set_secret(&self, key: &str, secret: &Secret) -> Result<(), ConfigError> {
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        let mut next = secrets.clone();
        next.insert(key.to_string(), secret.expose().to_string());
        self.flush_secrets(&next)?;
        *secrets = next;
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.keys().cloned().collect()
    }

    fn clear(&self) -> Result<(), ConfigError> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        self.flush_values(&BTreeMap::new())?;
        values.clear();
        self.flush_secrets(&BTreeMap::new())?;
        secrets.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_values_persist_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.toml");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("srv/auth_method", json!("password_login")).unwrap();
            store.set("srv/password_login/port", json!(22)).unwrap();
            store
                .set("servers", json!({"srv": {"host": "example.org"}}))
                .unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("srv/auth_method"), Some(json!("password_login")));
        assert_eq!(store.get_string("srv/password_login/port").as_deref(), Some("22"));
        assert_eq!(store.get("servers").unwrap()["srv"]["host"], "example.org");
    }

    #[test]
    fn test_secrets_go_to_separate_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.toml");

        let store = FileStore::open(&path).unwrap();
        store.set("srv/status", json!("inactive")).unwrap();
        store.set_secret("srv/password", &Secret::new("pw")).unwrap();

        let values = std::fs::read_to_string(&path).unwrap();
        assert!(!values.contains("pw\""));

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_secret("srv/password").unwrap().expose(), "pw");
    }

    #[cfg(unix)]
    #[test]
    fn test_secrets_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("store.toml")).unwrap();
        store.set_secret("srv/passphrase", &Secret::new("s")).unwrap();

        let meta = std::fs::metadata(dir.path().join("store.secrets.toml")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.toml");
        let store = FileStore::open(&path).unwrap();

        store.set("a", json!("1")).unwrap();
        store.set("b", json!("2")).unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.keys(), vec!["b".to_string()]);

        store.clear().unwrap();
        assert!(FileStore::open(&path).unwrap().keys().is_empty());
    }

    #[test]
    fn test_rejected_write_leaves_store_usable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.toml");
        let store = FileStore::open(&path).unwrap();
        store.set("servers", json!({"srv": {"host": "h"}})).unwrap();

        // TOML has no null
        let err = store
            .set("servers", json!({"srv": {"client_keys": null, "host": "h"}}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Serialize(_)));
        assert_eq!(store.get("servers"), Some(json!({"srv": {"host": "h"}})));

        store.set("srv/status", json!("active")).unwrap();
        store.set("srv/status_message", json!("")).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("srv/status"), Some(json!("active")));
        assert_eq!(reopened.get("servers"), Some(json!({"srv": {"host": "h"}})));
    }
}
