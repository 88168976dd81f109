//! rk-tunnel: SSH tunnels to remote kernels
//!
//! A remote kernel listens on five ports on the remote host. This crate
//! writes the kernel's connection descriptor to a local file, forwards each
//! of the five ports to a local port through an SSH session, and bundles
//! the result into a [`KernelHandle`] a console client can use.

pub mod connection_file;
pub mod error;
pub mod kernel;
pub mod target;
pub mod tunnel;

pub use connection_file::{new_connection_file, write_connection_file, KernelConnectionInfo};
pub use error::TunnelError;
pub use kernel::{KernelHandle, KernelPorts};
pub use target::SshTarget;
pub use tunnel::{KernelTunnel, SshTunnelOpener, TunnelGuard, TunnelOpener, TunnelRequest};
