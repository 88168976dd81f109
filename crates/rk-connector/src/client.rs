//! Console client abstraction

use rk_core::ServerId;
use rk_tunnel::KernelHandle;
use tokio::sync::broadcast;

use crate::events::ConnectorEvent;

/// A console that runs code on a remote kernel.
///
/// Clients are owned by their UI; the connector only keeps weak references
/// to them while a connection is in flight.
pub trait ConsoleClient: Send + Sync {
    /// Server this console belongs to
    fn server_id(&self) -> ServerId;

    /// Record the id of the kernel started for this console
    fn set_kernel_id(&self, kernel_id: &str);

    /// Show a kernel error to the user
    fn show_kernel_error(&self, message: &str);

    /// Start using a connected kernel
    fn connect_kernel(&self, kernel: KernelHandle);

    /// Receive the hook used to ask for the kernel's shutdown
    fn set_shutdown_hook(&self, _hook: KernelShutdownHook) {}
}

/// Lets a console request that its remote kernel be shut down
#[derive(Debug, Clone)]
pub struct KernelShutdownHook {
    server_id: ServerId,
    kernel_id: String,
    events: broadcast::Sender<ConnectorEvent>,
}

impl KernelShutdownHook {
    pub(crate) fn new(
        server_id: ServerId,
        kernel_id: String,
        events: broadcast::Sender<ConnectorEvent>,
    ) -> Self {
        Self {
            server_id,
            kernel_id,
            events,
        }
    }

    /// Kernel this hook refers to
    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    /// Ask for the kernel to be shut down on its server
    pub fn request_shutdown(&self) {
        let event = ConnectorEvent::ShutdownKernelRequested {
            server_id: self.server_id.clone(),
            kernel_id: self.kernel_id.clone(),
        };
        if self.events.send(event).is_err() {
            tracing::debug!(
                "No listener for shutdown of kernel {} on {}",
                self.kernel_id,
                self.server_id
            );
        }
    }
}
