//! Connector error types

use rk_core::ConfigError;
use rk_tunnel::TunnelError;
use thiserror::Error;

/// Errors raised while preparing a kernel connection
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Server settings could not be resolved
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The kernel connection file could not be written
    #[error("Connection file error: {0}")]
    ConnectionFile(#[from] TunnelError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
