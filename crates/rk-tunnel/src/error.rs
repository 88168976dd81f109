//! Tunnel error types

use std::time::Duration;

use thiserror::Error;

/// Errors raised while opening or using a kernel tunnel
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Hostname is not of the form `user@host[:port]`
    #[error("Invalid SSH hostname '{0}': expected user@host[:port]")]
    InvalidHostname(String),

    /// Kernel connection descriptor is missing ports or malformed
    #[error("Invalid kernel connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// Private key could not be loaded or decrypted
    #[error("Private key not usable at {path}: {message}")]
    KeyNotFound { path: String, message: String },

    /// Server rejected our credentials
    #[error("Authentication rejected for {user}@{host}")]
    AuthRejected { user: String, host: String },

    /// Could not establish the SSH session
    #[error("Failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// A forwarding listener could not be set up
    #[error("Port forwarding failed: {0}")]
    Forward(String),

    /// The operation did not finish in time
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    /// SSH protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TunnelError {
    fn from(e: serde_json::Error) -> Self {
        TunnelError::InvalidDescriptor(e.to_string())
    }
}
