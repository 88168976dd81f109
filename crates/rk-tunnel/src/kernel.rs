//! Kernel handles

use std::path::{Path, PathBuf};

use rk_core::Secret;
use serde::{Deserialize, Serialize};

use crate::connection_file::KernelConnectionInfo;
use crate::error::TunnelError;
use crate::tunnel::{KernelTunnel, TunnelGuard};

/// The five ports of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelPorts {
    pub shell: u16,
    pub iopub: u16,
    pub stdin: u16,
    pub control: u16,
    pub hb: u16,
}

impl KernelPorts {
    /// Ports as `(channel name, port)` pairs
    pub fn named(&self) -> [(&'static str, u16); 5] {
        [
            ("shell", self.shell),
            ("iopub", self.iopub),
            ("stdin", self.stdin),
            ("control", self.control),
            ("hb", self.hb),
        ]
    }

    /// Build from ports listed in [`KernelPorts::named`] order
    pub fn from_array(ports: [u16; 5]) -> Self {
        let [shell, iopub, stdin, control, hb] = ports;
        Self {
            shell,
            iopub,
            stdin,
            control,
            hb,
        }
    }
}

/// A kernel reachable through a local tunnel.
///
/// Dropping the handle (or calling [`KernelHandle::close`]) tears the
/// tunnel down.
#[derive(Debug)]
pub struct KernelHandle {
    connection_file: PathBuf,
    connection_info: KernelConnectionInfo,
    hostname: String,
    sshkey: Option<PathBuf>,
    password: Option<Secret>,
    ports: KernelPorts,
    tunnel: Option<TunnelGuard>,
}

impl KernelHandle {
    /// Build a handle from a connection file, the SSH host and credentials
    /// it was tunnelled through, and the tunnel's local ports.
    pub fn from_connection_file(
        connection_file: impl Into<PathBuf>,
        hostname: impl Into<String>,
        sshkey: Option<PathBuf>,
        password: Option<Secret>,
        tunnel: KernelTunnel,
    ) -> Result<Self, TunnelError> {
        let connection_file = connection_file.into();
        let connection_info = KernelConnectionInfo::from_file(&connection_file)?;
        let (ports, guard) = tunnel.into_parts();

        Ok(Self {
            connection_file,
            connection_info,
            hostname: hostname.into(),
            sshkey,
            password,
            ports,
            tunnel: Some(guard),
        })
    }

    /// Path of the local connection file
    pub fn connection_file(&self) -> &Path {
        &self.connection_file
    }

    /// Descriptor as published by the remote kernel
    pub fn remote_connection_info(&self) -> &KernelConnectionInfo {
        &self.connection_info
    }

    /// Descriptor pointing at the local end of the tunnel
    pub fn local_connection_info(&self) -> KernelConnectionInfo {
        self.connection_info.with_local_ports(&self.ports)
    }

    /// `user@host:port` the tunnel goes through
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Key file used for the tunnel, if any
    pub fn sshkey(&self) -> Option<&Path> {
        self.sshkey.as_deref()
    }

    /// Password or key passphrase used for the tunnel, if any
    pub fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    /// Local ports forwarded to the kernel
    pub fn ports(&self) -> KernelPorts {
        self.ports
    }

    /// Whether the tunnel is still up
    pub fn is_connected(&self) -> bool {
        self.tunnel.as_ref().is_some_and(|t| !t.is_closed())
    }

    /// Close the tunnel. The connection file is left in place.
    pub fn close(&mut self) {
        if let Some(tunnel) = self.tunnel.take() {
            tunnel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_file::{new_connection_file, write_connection_file};
    use serde_json::json;
    use tempfile::TempDir;

    fn local_ports() -> KernelPorts {
        KernelPorts::from_array([6001, 6002, 6003, 6004, 6005])
    }

    #[test]
    fn test_from_connection_file() {
        let dir = TempDir::new().unwrap();
        let path = new_connection_file(dir.path()).unwrap();
        write_connection_file(
            &path,
            &json!({
                "ip": "10.1.2.3",
                "shell_port": 1, "iopub_port": 2, "stdin_port": 3,
                "control_port": 4, "hb_port": 5, "key": "k"
            }),
        )
        .unwrap();

        let mut handle = KernelHandle::from_connection_file(
            &path,
            "u@h:22",
            None,
            Some(Secret::new("pw")),
            KernelTunnel::detached(local_ports()),
        )
        .unwrap();

        assert_eq!(handle.hostname(), "u@h:22");
        assert_eq!(handle.ports(), local_ports());
        assert_eq!(handle.remote_connection_info().shell_port, 1);
        assert_eq!(handle.local_connection_info().shell_port, 6001);
        assert_eq!(handle.local_connection_info().ip, "127.0.0.1");
        assert!(handle.is_connected());

        handle.close();
        assert!(!handle.is_connected());
        assert!(path.exists());
    }

    #[test]
    fn test_tunnel_shut_down_elsewhere_reports_disconnected() {
        let dir = TempDir::new().unwrap();
        let path = new_connection_file(dir.path()).unwrap();
        write_connection_file(
            &path,
            &json!({
                "shell_port": 1, "iopub_port": 2, "stdin_port": 3,
                "control_port": 4, "hb_port": 5
            }),
        )
        .unwrap();

        let session = tokio_util::sync::CancellationToken::new();
        let handle = KernelHandle::from_connection_file(
            &path,
            "u@h:22",
            None,
            None,
            KernelTunnel::new(local_ports(), TunnelGuard::new(session.clone())),
        )
        .unwrap();
        assert!(handle.is_connected());

        // The session watcher cancels the shared token when the server goes away
        session.cancel();
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_missing_connection_file() {
        let dir = TempDir::new().unwrap();
        let err = KernelHandle::from_connection_file(
            dir.path().join("gone.json"),
            "u@h:22",
            None,
            None,
            KernelTunnel::detached(local_ports()),
        )
        .unwrap_err();
        assert!(matches!(err, TunnelError::Io(_)));
    }

    #[test]
    fn test_named_order() {
        let names: Vec<_> = local_ports().named().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["shell", "iopub", "stdin", "control", "hb"]);
    }
}
