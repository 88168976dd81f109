//! Kernel connection descriptors and connection files
//!
//! The descriptor is the JSON document a kernel publishes with its ports,
//! transport and message-signing key. It is written to disk unchanged; only
//! the fields needed for tunnelling are given types, every other key is kept
//! as-is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TunnelError;
use crate::kernel::KernelPorts;

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_transport() -> String {
    "tcp".to_string()
}

/// Kernel connection descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConnectionInfo {
    /// Address the kernel listens on, as seen from the remote host
    #[serde(default = "default_ip")]
    pub ip: String,
    /// Transport, usually `tcp`
    #[serde(default = "default_transport")]
    pub transport: String,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    /// Signing key, signature scheme, kernel name and anything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KernelConnectionInfo {
    /// Parse a descriptor from its JSON value
    pub fn from_value(value: &Value) -> Result<Self, TunnelError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Read a descriptor from a connection file
    pub fn from_file(path: &Path) -> Result<Self, TunnelError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The kernel's ports
    pub fn ports(&self) -> KernelPorts {
        KernelPorts {
            shell: self.shell_port,
            iopub: self.iopub_port,
            stdin: self.stdin_port,
            control: self.control_port,
            hb: self.hb_port,
        }
    }

    /// Host to forward to from the remote side.
    ///
    /// Wildcard binds are reached through loopback.
    pub fn remote_host(&self) -> String {
        match self.ip.as_str() {
            "" | "*" | "0.0.0.0" => "127.0.0.1".to_string(),
            "::" => "::1".to_string(),
            ip => ip.to_string(),
        }
    }

    /// Copy of this descriptor pointing at local forwarded ports
    pub fn with_local_ports(&self, ports: &KernelPorts) -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            shell_port: ports.shell,
            iopub_port: ports.iopub,
            stdin_port: ports.stdin,
            control_port: ports.control,
            hb_port: ports.hb,
            ..self.clone()
        }
    }
}

/// Allocate a fresh, unique connection file path inside `runtime_dir`.
///
/// The directory is created if needed; the file itself is not.
pub fn new_connection_file(runtime_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(runtime_dir)?;
    Ok(runtime_dir.join(format!("kernel-{}.json", uuid::Uuid::new_v4())))
}

/// Write a connection descriptor in its native JSON layout
pub fn write_connection_file(path: &Path, connection_info: &Value) -> Result<(), TunnelError> {
    let content = serde_json::to_vec_pretty(connection_info)?;
    std::fs::write(path, content)?;
    tracing::debug!("Wrote kernel connection file {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn descriptor() -> Value {
        json!({
            "ip": "0.0.0.0",
            "transport": "tcp",
            "shell_port": 50001,
            "iopub_port": 50002,
            "stdin_port": 50003,
            "control_port": 50004,
            "hb_port": 50005,
            "key": "secret-key",
            "signature_scheme": "hmac-sha256",
            "kernel_name": "python3"
        })
    }

    #[test]
    fn test_parse_keeps_vendor_keys() {
        let info = KernelConnectionInfo::from_value(&descriptor()).unwrap();
        assert_eq!(info.ports().shell, 50001);
        assert_eq!(info.extra["signature_scheme"], "hmac-sha256");
        assert_eq!(info.remote_host(), "127.0.0.1");
    }

    #[test]
    fn test_missing_port_is_invalid() {
        let err = KernelConnectionInfo::from_value(&json!({"shell_port": 1})).unwrap_err();
        assert!(matches!(err, TunnelError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_connection_files_are_unique() {
        let dir = TempDir::new().unwrap();
        let runtime = dir.path().join("runtime");
        let a = new_connection_file(&runtime).unwrap();
        let b = new_connection_file(&runtime).unwrap();

        assert_ne!(a, b);
        assert!(runtime.is_dir());
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("kernel-"));
    }

    #[test]
    fn test_written_file_is_native_layout() {
        let dir = TempDir::new().unwrap();
        let path = new_connection_file(dir.path()).unwrap();
        write_connection_file(&path, &descriptor()).unwrap();

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, descriptor());

        let parsed = KernelConnectionInfo::from_file(&path).unwrap();
        assert_eq!(parsed.extra["key"], "secret-key");
    }

    #[test]
    fn test_with_local_ports() {
        let info = KernelConnectionInfo::from_value(&descriptor()).unwrap();
        let local = info.with_local_ports(&KernelPorts {
            shell: 1,
            iopub: 2,
            stdin: 3,
            control: 4,
            hb: 5,
        });
        assert_eq!(local.ip, "127.0.0.1");
        assert_eq!(local.hb_port, 5);
        assert_eq!(local.extra, info.extra);
    }
}
