//! SSH-backed tunnel opener
//!
//! Connects to the kernel's host, authenticates with the configured key
//! file or password, and forwards the kernel's five ports to ephemeral
//! ports on `127.0.0.1`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use rk_core::Secret;

use super::forward::forward_port;
use super::{KernelTunnel, TunnelGuard, TunnelOpener, TunnelRequest};
use crate::connection_file::KernelConnectionInfo;
use crate::error::TunnelError;
use crate::kernel::KernelPorts;
use crate::target::SshTarget;

/// How often an open tunnel checks whether its SSH session is still alive
const SESSION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Opens kernel tunnels over SSH
pub struct SshTunnelOpener {
    /// Timeout for TCP connect plus SSH handshake
    connect_timeout: Duration,
    /// Expected host key fingerprint, if known
    expected_host_key: Option<String>,
}

impl SshTunnelOpener {
    /// Create an opener with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            expected_host_key: None,
        }
    }

    /// Only accept servers presenting this host key fingerprint
    pub fn with_host_key(mut self, fingerprint: impl Into<String>) -> Self {
        self.expected_host_key = Some(fingerprint.into());
        self
    }

    async fn connect(&self, target: &SshTarget) -> Result<Handle<ClientHandler>, TunnelError> {
        let ssh_config = Arc::new(Config::default());
        let handler = ClientHandler::new(self.expected_host_key.clone());

        tracing::debug!("Connecting to {}:{}", target.host, target.port);
        tokio::time::timeout(
            self.connect_timeout,
            client::connect(ssh_config, (target.host.as_str(), target.port), handler),
        )
        .await
        .map_err(|_| TunnelError::TimedOut(self.connect_timeout))?
        .map_err(|e| TunnelError::Connect {
            host: target.host.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TunnelOpener for SshTunnelOpener {
    async fn open(&self, request: TunnelRequest) -> Result<KernelTunnel, TunnelError> {
        let target: SshTarget = request.hostname.parse()?;
        let descriptor = KernelConnectionInfo::from_value(&request.connection_info)?;

        let mut session = self.connect(&target).await?;
        authenticate(
            &mut session,
            &target,
            request.sshkey.as_deref(),
            request.password.as_ref(),
        )
        .await?;
        tracing::debug!("Authenticated to {} as '{}'", target.host, target.user);

        let session = Arc::new(session);
        let cancel = CancellationToken::new();
        // Any early return below drops the guard, which stops what was
        // already spawned.
        let guard = TunnelGuard::new(cancel.clone());

        let remote_host = descriptor.remote_host();
        let mut local_ports = [0u16; 5];
        for (slot, (name, remote_port)) in descriptor.ports().named().into_iter().enumerate() {
            let listener = TcpListener::bind(("127.0.0.1", 0))
                .await
                .map_err(|e| TunnelError::Forward(format!("bind for {} channel: {}", name, e)))?;
            local_ports[slot] = listener.local_addr()?.port();

            tracing::debug!(
                "Forwarding {} channel 127.0.0.1:{} -> {}:{}",
                name,
                local_ports[slot],
                remote_host,
                remote_port
            );
            tokio::spawn(forward_port(
                listener,
                Arc::clone(&session),
                remote_host.clone(),
                remote_port,
                cancel.child_token(),
            ));
        }

        let host = target.host.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = session
                        .disconnect(Disconnect::ByApplication, "tunnel closed", "en")
                        .await
                    {
                        tracing::debug!("Disconnect from {} failed: {}", host, e);
                    }
                }
                _ = wait_until_closed(|| session.is_closed(), SESSION_POLL_INTERVAL) => {
                    tracing::warn!("SSH session to {} closed by the server", host);
                    cancel.cancel();
                }
            }
        });

        let ports = KernelPorts::from_array(local_ports);
        tracing::info!("Tunnel to {} open: {:?}", target, ports);
        Ok(KernelTunnel::new(ports, guard))
    }
}

/// Resolve once `is_closed` reports true, checking every `interval`
async fn wait_until_closed<F: Fn() -> bool>(is_closed: F, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if is_closed() {
            return;
        }
    }
}

/// Authenticate with a key file (using the password as its passphrase),
/// a password, or nothing at all
async fn authenticate(
    session: &mut Handle<ClientHandler>,
    target: &SshTarget,
    sshkey: Option<&Path>,
    password: Option<&Secret>,
) -> Result<(), TunnelError> {
    let authenticated = match (sshkey, password) {
        (Some(keyfile), passphrase) => {
            let key = russh_keys::load_secret_key(keyfile, passphrase.map(|p| p.expose()))
                .map_err(|e| TunnelError::KeyNotFound {
                    path: keyfile.display().to_string(),
                    message: e.to_string(),
                })?;
            session
                .authenticate_publickey(target.user.as_str(), Arc::new(key))
                .await?
        }
        (None, Some(password)) => {
            session
                .authenticate_password(target.user.as_str(), password.expose())
                .await?
        }
        (None, None) => session.authenticate_none(target.user.as_str()).await?,
    };

    if !authenticated {
        return Err(TunnelError::AuthRejected {
            user: target.user.clone(),
            host: target.host.clone(),
        });
    }
    Ok(())
}

/// SSH client handler for tunnel sessions
pub(super) struct ClientHandler {
    /// Expected host key fingerprint (for verification)
    expected_host_key: Option<String>,
}

impl ClientHandler {
    fn new(expected_host_key: Option<String>) -> Self {
        Self { expected_host_key }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Verify the server's host key.
    ///
    /// Without a configured fingerprint every key is accepted.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Server host key: {}", fingerprint);

        match &self.expected_host_key {
            Some(expected) if *expected != fingerprint => {
                tracing::warn!(
                    "Host key mismatch: expected {}, got {}",
                    expected,
                    fingerprint
                );
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_is_noticed() {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::timeout(
            Duration::from_secs(10),
            wait_until_closed(|| closed.load(Ordering::SeqCst), SESSION_POLL_INTERVAL),
        )
        .await
        .expect("closed session not noticed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_session_keeps_waiting() {
        let waited = tokio::time::timeout(
            Duration::from_secs(30),
            wait_until_closed(|| false, SESSION_POLL_INTERVAL),
        )
        .await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_invalid_hostname_fails_before_connecting() {
        let opener = SshTunnelOpener::new(Duration::from_secs(1));
        let err = opener
            .open(TunnelRequest {
                connection_info: json!({}),
                hostname: "no-user-here".to_string(),
                sshkey: None,
                password: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::InvalidHostname(_)));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_fails_before_connecting() {
        let opener = SshTunnelOpener::new(Duration::from_secs(1));
        let err = opener
            .open(TunnelRequest {
                connection_info: json!({"shell_port": 1}),
                hostname: "user@127.0.0.1:1".to_string(),
                sshkey: None,
                password: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::InvalidDescriptor(_)));
    }
}
