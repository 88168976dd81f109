//! Connection status persistence

use std::collections::BTreeMap;

use rk_core::store::{self, server_key, DefaultsProvider, SERVERS_KEY};
use rk_core::{ConnectionInfo, ConnectionStatus, ServerId};
use serde_json::{json, Value};

use super::RemoteKernelConnector;
use crate::error::ConnectorError;
use crate::events::ConnectorEvent;

impl RemoteKernelConnector {
    /// Persist a status update so it survives a reopened dialog, and
    /// forward it to observers
    pub fn on_connection_status_changed(&self, info: ConnectionInfo) -> Result<(), ConnectorError> {
        self.store.set(
            &server_key(&info.id, "status"),
            json!(info.status.as_str()),
        )?;
        self.store
            .set(&server_key(&info.id, "status_message"), json!(info.message))?;

        tracing::debug!("Status of {} is now {}", info.id, info.status);
        let _ = self.events.send(ConnectorEvent::StatusChanged(info));
        Ok(())
    }

    /// Last persisted status of a server, if any
    pub fn connection_status(&self, id: &ServerId) -> Option<ConnectionInfo> {
        let status = self.store.get(&server_key(id, "status"))?;
        let status: ConnectionStatus = serde_json::from_value(status).ok()?;
        let message = self
            .store
            .get_string(&server_key(id, "status_message"))
            .unwrap_or_default();
        Some(ConnectionInfo::new(id.clone(), status, message))
    }

    /// Mark every configured server inactive with an empty message
    pub fn reset_status(&self) -> Result<(), ConnectorError> {
        for id in store::server_ids(self.store.as_ref()) {
            self.store
                .set(&server_key(&id, "status"), json!(ConnectionStatus::Inactive.as_str()))?;
            self.store.set(&server_key(&id, "status_message"), json!(""))?;
        }
        Ok(())
    }
}

/// Defaults for the keys the connector owns
pub struct ConnectorDefaults;

impl DefaultsProvider for ConnectorDefaults {
    fn name(&self) -> &str {
        "remoteclient"
    }

    fn defaults(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([(SERVERS_KEY.to_string(), json!({}))])
    }
}
