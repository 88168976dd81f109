//! rk-connector: Connect console clients to remote kernels
//!
//! When a remote server has started a kernel for a console client, the
//! [`RemoteKernelConnector`] resolves the server's stored SSH credentials,
//! writes the kernel's connection file, opens the tunnel on a bounded
//! worker pool and finally hands the client a ready
//! [`rk_tunnel::KernelHandle`], or reports the failure to that client.

pub mod client;
pub mod connector;
pub mod error;
pub mod events;
pub mod worker;

pub use client::{ConsoleClient, KernelShutdownHook};
pub use connector::{ConnectorDefaults, ConsoleEntry, RemoteKernelConnector};
pub use error::ConnectorError;
pub use events::ConnectorEvent;
pub use worker::{JobId, JobOutcome, WorkerPool};
