//! Per-server console entries and server lifecycle requests

use rk_core::store::{self, method_key};
use rk_core::{ConfigError, ServerId};
use tokio::sync::broadcast;

use super::RemoteKernelConnector;
use crate::events::ConnectorEvent;

/// "New console in … server" entry for one configured server
#[derive(Debug, Clone)]
pub struct ConsoleEntry {
    /// Server the entry opens a console for
    pub server_id: ServerId,
    /// Text shown to the user
    pub label: String,
    events: broadcast::Sender<ConnectorEvent>,
}

impl ConsoleEntry {
    /// Request a new console for this entry's server
    pub fn trigger(&self) {
        let _ = self
            .events
            .send(ConnectorEvent::CreateConsoleRequested(self.server_id.clone()));
    }
}

impl RemoteKernelConnector {
    /// Ids of all configured servers
    pub fn config_ids(&self) -> Vec<ServerId> {
        store::server_ids(self.store.as_ref())
    }

    /// Display name of a server
    pub fn server_name(&self, id: &ServerId) -> Result<String, ConfigError> {
        let auth_method = store::auth_method(self.store.as_ref(), id)?;
        store::require_string(self.store.as_ref(), &method_key(id, auth_method, "name"))
    }

    /// One entry per configured server, rebuilt from the store on every call
    pub fn remote_console_entries(&self) -> Vec<ConsoleEntry> {
        self.config_ids()
            .into_iter()
            .map(|id| {
                let name = self.server_name(&id).unwrap_or_else(|e| {
                    tracing::debug!("No name for server {}: {}", id, e);
                    id.to_string()
                });
                ConsoleEntry {
                    label: format!("New console in {} server", name),
                    server_id: id,
                    events: self.events.clone(),
                }
            })
            .collect()
    }

    /// Ask the server lifecycle manager to start a server
    pub fn request_start_server(&self, id: ServerId) {
        let _ = self.events.send(ConnectorEvent::StartServerRequested(id));
    }

    /// Ask the server lifecycle manager to stop a server
    pub fn request_stop_server(&self, id: ServerId) {
        let _ = self.events.send(ConnectorEvent::StopServerRequested(id));
    }
}
