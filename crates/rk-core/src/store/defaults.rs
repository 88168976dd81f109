//! Registry of configuration defaults
//!
//! Components that own configuration keys register a [`DefaultsProvider`]
//! when the process starts. Resetting a store wipes it and re-applies every
//! registered provider in registration order, then records a summary of
//! each provider under [`PROVIDER_CONFIGURATION_KEY`].

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::ConfigStore;
use crate::error::ConfigError;

/// Key under which the per-provider summary is stored
pub const PROVIDER_CONFIGURATION_KEY: &str = "provider_configuration";

/// Supplies default values for the keys a component owns
pub trait DefaultsProvider: Send + Sync {
    /// Unique provider name
    fn name(&self) -> &str;

    /// Version of the provider's configuration layout
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Default values, keyed by store key
    fn defaults(&self) -> BTreeMap<String, Value>;
}

/// Statically populated list of defaults providers
#[derive(Default)]
pub struct DefaultsRegistry {
    providers: Vec<Box<dyn DefaultsProvider>>,
}

impl DefaultsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. A provider with the same name replaces the
    /// earlier one.
    pub fn register(&mut self, provider: impl DefaultsProvider + 'static) -> &mut Self {
        self.providers.retain(|p| p.name() != provider.name());
        self.providers.push(Box::new(provider));
        self
    }

    /// Names of the registered providers, in registration order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Wipe the store and apply every provider's defaults
    pub fn reset_to_defaults(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        store.clear()?;

        let mut summary = Map::new();
        for provider in &self.providers {
            let defaults = provider.defaults();
            for (key, value) in &defaults {
                store.set(key, value.clone())?;
            }

            let defaults: Map<String, Value> = defaults.into_iter().collect();
            summary.insert(
                provider.name().to_string(),
                json!({
                    "version": provider.version(),
                    "values": defaults.clone(),
                    "defaults": defaults,
                }),
            );
        }

        store.set(PROVIDER_CONFIGURATION_KEY, Value::Object(summary))?;
        tracing::debug!("Reset config store to {} provider defaults", self.providers.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct Fixed(&'static str, &'static str, Value);

    impl DefaultsProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn defaults(&self) -> BTreeMap<String, Value> {
            BTreeMap::from([(self.1.to_string(), self.2.clone())])
        }
    }

    #[test]
    fn test_reset_wipes_and_applies() {
        let store = MemoryStore::new();
        store.set("stale", json!(true)).unwrap();

        let mut registry = DefaultsRegistry::new();
        registry
            .register(Fixed("first", "servers", json!({})))
            .register(Fixed("second", "theme", json!("dark")));
        registry.reset_to_defaults(&store).unwrap();

        assert!(store.get("stale").is_none());
        assert_eq!(store.get("servers"), Some(json!({})));
        assert_eq!(store.get("theme"), Some(json!("dark")));

        let summary = store.get(PROVIDER_CONFIGURATION_KEY).unwrap();
        assert_eq!(summary["second"]["version"], "1.0.0");
        assert_eq!(summary["second"]["defaults"]["theme"], "dark");
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = DefaultsRegistry::new();
        registry
            .register(Fixed("p", "a", json!(1)))
            .register(Fixed("p", "b", json!(2)));
        assert_eq!(registry.provider_names(), vec!["p"]);
    }
}
