//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Identifier of a configured remote server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    /// Create a new server ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Credential scheme used to reach a server.
///
/// The string forms double as the namespace under which the method's
/// fields are stored (`{id}/{method}/address`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMethod {
    /// Username and password
    #[serde(rename = "password_login")]
    Password,
    /// Private key file with optional passphrase
    #[serde(rename = "keyfile_login")]
    KeyFile,
    /// Host entry from an SSH config file
    #[serde(rename = "configfile_login")]
    ConfigFile,
}

impl AuthMethod {
    /// Storage name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password_login",
            AuthMethod::KeyFile => "keyfile_login",
            AuthMethod::ConfigFile => "configfile_login",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password_login" => Ok(AuthMethod::Password),
            "keyfile_login" => Ok(AuthMethod::KeyFile),
            "configfile_login" => Ok(AuthMethod::ConfigFile),
            other => Err(ConfigError::UnknownAuthMethod(other.to_string())),
        }
    }
}

/// Connection status for a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection has been made
    Inactive,
    /// Connection is being established
    Connecting,
    /// Server is connected and ready
    Active,
    /// Server is being stopped
    Stopping,
    /// Last connection attempt failed
    Error,
}

impl ConnectionStatus {
    /// Storage name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Inactive => "inactive",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Stopping => "stopping",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live or last-known state of the connection to one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Server the status refers to
    pub id: ServerId,
    /// Current status
    pub status: ConnectionStatus,
    /// Human-readable detail, empty when there is nothing to say
    pub message: String,
}

impl ConnectionInfo {
    /// Create a new status record
    pub fn new(id: impl Into<ServerId>, status: ConnectionStatus, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status,
            message: message.into(),
        }
    }
}

/// Result of a remote "start kernel" request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelInfo {
    /// Kernel id on the remote server
    pub id: String,
    /// Kernel connection descriptor, passed through untouched
    pub connection_info: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_round_trips_storage_name() {
        for method in [AuthMethod::Password, AuthMethod::KeyFile, AuthMethod::ConfigFile] {
            assert_eq!(method.as_str().parse::<AuthMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_auth_method() {
        let err = "kerberos".parse::<AuthMethod>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAuthMethod(ref m) if m == "kerberos"));
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(format!("{}", ConnectionStatus::Inactive), "inactive");
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Active).unwrap(),
            "\"active\""
        );
    }

    #[test]
    fn test_kernel_info_deserialize() {
        let json = r#"{"id":"k-1","connection_info":{"shell_port":5000,"key":"abc"}}"#;
        let info: KernelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, "k-1");
        assert_eq!(info.connection_info["shell_port"], 5000);
    }
}
