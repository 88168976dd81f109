//! Events published by the connector

use rk_core::{ConnectionInfo, ServerId};

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications for observers such as a connection dialog or the server
/// lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// A server's connection status changed
    StatusChanged(ConnectionInfo),
    /// Starting a server was requested
    StartServerRequested(ServerId),
    /// Stopping a server was requested
    StopServerRequested(ServerId),
    /// A new console for a server was requested
    CreateConsoleRequested(ServerId),
    /// A console asked for its kernel to be shut down
    ShutdownKernelRequested {
        server_id: ServerId,
        kernel_id: String,
    },
}
