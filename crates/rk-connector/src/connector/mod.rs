//! Remote kernel connector
//!
//! Connecting a console to a remote kernel happens in two halves.
//! [`RemoteKernelConnector::begin_kernel_connection`] runs on the caller's
//! task: it resolves the server's credentials, writes the kernel's
//! connection file and queues the tunnel on the worker pool. When the
//! tunnel job finishes, [`RemoteKernelConnector::finish_kernel_connection`]
//! either attaches a [`KernelHandle`] to the console or shows it the error.
//!
//! Completions are consumed by [`RemoteKernelConnector::run`] (or one at a
//! time with [`RemoteKernelConnector::finish_next`]).

pub mod credentials;
mod job;
mod menu;
mod status;

pub use menu::ConsoleEntry;
pub use status::ConnectorDefaults;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rk_core::config::ConnectorConfig;
use rk_core::{ConfigStore, KernelInfo, ServerId};
use rk_tunnel::{
    new_connection_file, write_connection_file, KernelHandle, KernelTunnel, TunnelOpener,
    TunnelRequest,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use self::credentials::ResolvedCredentials;
use self::job::PendingConnectionJob;
use crate::client::{ConsoleClient, KernelShutdownHook};
use crate::error::ConnectorError;
use crate::events::{ConnectorEvent, EVENT_CHANNEL_CAPACITY};
use crate::worker::{JobId, JobOutcome, WorkerPool};

/// Connects console clients to kernels started on remote servers
pub struct RemoteKernelConnector {
    store: Arc<dyn ConfigStore>,
    opener: Arc<dyn TunnelOpener>,
    runtime_dir: PathBuf,
    pool: WorkerPool<KernelTunnel>,
    pending: DashMap<JobId, PendingConnectionJob>,
    outcomes: Mutex<mpsc::UnboundedReceiver<JobOutcome<KernelTunnel>>>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl RemoteKernelConnector {
    /// Create a connector reading server settings from `store` and opening
    /// tunnels with `opener`
    pub fn new(
        config: &ConnectorConfig,
        store: Arc<dyn ConfigStore>,
        opener: Arc<dyn TunnelOpener>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pool = WorkerPool::new(config.max_workers, outcome_tx).with_timeout(config.tunnel_timeout);

        Self {
            store,
            opener,
            runtime_dir: config.runtime_dir.clone(),
            pool,
            pending: DashMap::new(),
            outcomes: Mutex::new(outcome_rx),
            events,
        }
    }

    /// Subscribe to connector events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    /// Store the connector reads from and writes status to
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Directory connection files are written to
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Worker pool the tunnel jobs run on
    pub fn pool(&self) -> &WorkerPool<KernelTunnel> {
        &self.pool
    }

    /// Number of connections started but not yet finished
    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Start connecting `client` to the kernel described by `kernel_info`.
    ///
    /// Returns once the tunnel job is queued. If the server's settings are
    /// incomplete or the connection file cannot be written, the client is
    /// shown the error and nothing is queued.
    pub fn begin_kernel_connection(
        &self,
        client: &Arc<dyn ConsoleClient>,
        kernel_info: KernelInfo,
    ) -> Result<JobId, ConnectorError> {
        let server_id = client.server_id();
        client.set_kernel_id(&kernel_info.id);
        client.set_shutdown_hook(KernelShutdownHook::new(
            server_id.clone(),
            kernel_info.id.clone(),
            self.events.clone(),
        ));

        let (credentials, connection_file) = match self.prepare(&server_id, &kernel_info) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!("Cannot connect to kernel {} on {}: {}", kernel_info.id, server_id, e);
                client.show_kernel_error(&e.to_string());
                return Err(e);
            }
        };

        let id = self.pool.reserve();
        self.pending.insert(
            id,
            PendingConnectionJob {
                client: Arc::downgrade(client),
                server_id: server_id.clone(),
                kernel_id: kernel_info.id.clone(),
                connection_file,
                hostname: credentials.hostname.clone(),
                sshkey: credentials.sshkey.clone(),
                password: credentials.password.clone(),
            },
        );

        let request = TunnelRequest {
            connection_info: kernel_info.connection_info,
            hostname: credentials.hostname,
            sshkey: credentials.sshkey,
            password: credentials.password,
        };
        let opener = Arc::clone(&self.opener);
        self.pool.start(id, async move { opener.open(request).await });

        tracing::info!(
            "Connecting to kernel {} on {} ({})",
            kernel_info.id,
            server_id,
            id
        );
        Ok(id)
    }

    /// Resolve credentials and write the connection file
    fn prepare(
        &self,
        server_id: &ServerId,
        kernel_info: &KernelInfo,
    ) -> Result<(ResolvedCredentials, PathBuf), ConnectorError> {
        let credentials = credentials::resolve(self.store.as_ref(), server_id)?;
        let connection_file = new_connection_file(&self.runtime_dir)?;
        write_connection_file(&connection_file, &kernel_info.connection_info)?;
        tracing::debug!(
            "Wrote connection file {} for kernel {}",
            connection_file.display(),
            kernel_info.id
        );
        Ok((credentials, connection_file))
    }

    /// Hand a finished tunnel job's result to its console.
    ///
    /// Outcomes of jobs that are unknown (already finished, or dropped by
    /// [`RemoteKernelConnector::close`]) and of consoles that no longer
    /// exist are discarded. A discarded tunnel is closed.
    pub fn finish_kernel_connection(&self, outcome: JobOutcome<KernelTunnel>) {
        let Some((_, job)) = self.pending.remove(&outcome.id) else {
            tracing::debug!("Discarding outcome of unknown {}", outcome.id);
            return;
        };

        let Some(client) = job.client.upgrade() else {
            tracing::debug!(
                "Console for kernel {} on {} is gone, discarding {}",
                job.kernel_id,
                job.server_id,
                outcome.id
            );
            return;
        };

        let tunnel = match outcome.result {
            Ok(tunnel) => tunnel,
            Err(e) => {
                tracing::warn!("Tunnel to kernel {} on {} failed: {}", job.kernel_id, job.server_id, e);
                client.show_kernel_error(&e.to_string());
                return;
            }
        };

        match KernelHandle::from_connection_file(
            &job.connection_file,
            job.hostname,
            job.sshkey,
            job.password,
            tunnel,
        ) {
            Ok(handle) => {
                tracing::info!("Kernel {} on {} connected", job.kernel_id, job.server_id);
                client.connect_kernel(handle);
            }
            Err(e) => {
                tracing::warn!(
                    "Cannot load connection file {}: {}",
                    job.connection_file.display(),
                    e
                );
                client.show_kernel_error(&e.to_string());
            }
        }
    }

    /// Wait for the next finished job and handle it
    pub async fn finish_next(&self) -> Option<JobId> {
        let outcome = self.outcomes.lock().await.recv().await?;
        let id = outcome.id;
        self.finish_kernel_connection(outcome);
        Some(id)
    }

    /// Handle finished jobs until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                finished = self.finish_next() => {
                    if finished.is_none() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Connector completion loop stopped");
    }

    /// Cancel every outstanding connection. No console hears back from a
    /// job that was still queued or running.
    pub fn close(&self) {
        let outstanding = self.pending.len();
        self.pool.terminate_all();
        self.pending.clear();
        tracing::info!("Connector closed, dropped {} pending connection(s)", outstanding);
    }

    /// [`RemoteKernelConnector::close`], then wait for the cancelled jobs
    /// to exit
    pub async fn shutdown(&self) {
        self.close();
        self.pool.wait_idle().await;
    }
}

impl Drop for RemoteKernelConnector {
    fn drop(&mut self) {
        self.pool.terminate_all();
    }
}
