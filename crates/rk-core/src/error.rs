//! Core error types for the remote kernel connector

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and configuration-store errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The stored authentication method is not one we know about
    #[error("Unknown authentication method: {0}")]
    UnknownAuthMethod(String),

    /// A stored value has the wrong shape for the requested field
    #[error("Unexpected value for {key}: expected {expected}")]
    UnexpectedType {
        key: String,
        expected: &'static str,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
