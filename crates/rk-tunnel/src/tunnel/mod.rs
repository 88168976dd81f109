//! Tunnel opening

mod forward;
mod ssh;

pub use ssh::SshTunnelOpener;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use rk_core::Secret;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TunnelError;
use crate::kernel::KernelPorts;

/// Everything needed to open a tunnel to one kernel
#[derive(Debug, Clone)]
pub struct TunnelRequest {
    /// Kernel connection descriptor as returned by the server
    pub connection_info: Value,
    /// `user@host:port` of the SSH server
    pub hostname: String,
    /// Private key file, if key authentication is used
    pub sshkey: Option<PathBuf>,
    /// Password, or passphrase for `sshkey`
    pub password: Option<Secret>,
}

/// Opens tunnels to remote kernels
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    /// Open a tunnel and return the local ports bound for the kernel
    async fn open(&self, request: TunnelRequest) -> Result<KernelTunnel, TunnelError>;
}

/// An open tunnel: the local ports plus the guard keeping them alive
#[derive(Debug)]
pub struct KernelTunnel {
    ports: KernelPorts,
    guard: TunnelGuard,
}

impl KernelTunnel {
    /// Wrap ports and the guard that owns the forwarding tasks
    pub fn new(ports: KernelPorts, guard: TunnelGuard) -> Self {
        Self { ports, guard }
    }

    /// A tunnel with nothing behind it, for kernels that are reachable
    /// directly and for tests
    pub fn detached(ports: KernelPorts) -> Self {
        Self::new(ports, TunnelGuard::new(CancellationToken::new()))
    }

    /// Local ports
    pub fn ports(&self) -> KernelPorts {
        self.ports
    }

    /// Split into ports and guard
    pub fn into_parts(self) -> (KernelPorts, TunnelGuard) {
        (self.ports, self.guard)
    }
}

/// Stops the tunnel's forwarding tasks and SSH session when dropped
pub struct TunnelGuard {
    cancel: CancellationToken,
}

impl TunnelGuard {
    /// Guard the tasks listening on `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Whether the tunnel has been shut down
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shut the tunnel down now
    pub fn close(self) {
        self.cancel.cancel();
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for TunnelGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelGuard")
            .field("closed", &self.is_closed())
            .finish()
    }
}
