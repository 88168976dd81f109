//! Connector configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the remote kernel connector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Maximum number of tunnels opened at the same time.
    /// Further requests wait for a free slot.
    pub max_workers: usize,

    /// Directory where kernel connection files are written
    pub runtime_dir: PathBuf,

    /// Path of the TOML file backing the configuration store
    pub store_path: PathBuf,

    /// Timeout for the SSH connect and authentication phase
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Upper bound for a whole tunnel-open job, so a stuck handshake
    /// cannot hold a worker slot forever
    #[serde(with = "duration_secs")]
    pub tunnel_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            runtime_dir: super::default_runtime_dir(),
            store_path: super::default_config_dir().join("store.toml"),
            connect_timeout: Duration::from_secs(30),
            tunnel_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert_eq!(config.max_workers, 5);
        assert!(config.connect_timeout < config.tunnel_timeout);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ConnectorConfig = toml::from_str("max_workers = 3\ntunnel_timeout = 120\n").unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.tunnel_timeout, Duration::from_secs(120));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }
}
