//! Local port forwarding over an SSH session

use std::sync::Arc;
use std::time::Duration;

use russh::client::Handle;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::ssh::ClientHandler;

/// Pause after a failed `accept` before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept connections on `listener` and forward each one to
/// `remote_host:remote_port` through a `direct-tcpip` channel, until
/// `cancel` fires.
pub(super) async fn forward_port(
    listener: TcpListener,
    session: Arc<Handle<ClientHandler>>,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Stopping forwarder for {}:{}", remote_host, remote_port);
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, _peer)) => {
                        tokio::spawn(forward_connection(
                            socket,
                            Arc::clone(&session),
                            remote_host.clone(),
                            remote_port,
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed on forwarder for {}:{}: {}", remote_host, remote_port, e);
                        // Errors such as EMFILE persist; don't spin on them
                        if !pause_unless_cancelled(&cancel, ACCEPT_RETRY_DELAY).await {
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Sleep for `delay`. Returns `false` if `cancel` fired first.
async fn pause_unless_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn forward_connection(
    mut socket: TcpStream,
    session: Arc<Handle<ClientHandler>>,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
) {
    let (origin_host, origin_port) = match socket.peer_addr() {
        Ok(addr) => (addr.ip().to_string(), addr.port()),
        Err(_) => ("127.0.0.1".to_string(), 0),
    };

    let channel = match session
        .channel_open_direct_tcpip(
            remote_host.clone(),
            u32::from(remote_port),
            origin_host,
            u32::from(origin_port),
        )
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!("Failed to open channel to {}:{}: {}", remote_host, remote_port, e);
            return;
        }
    };

    let mut stream = channel.into_stream();
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::io::copy_bidirectional(&mut socket, &mut stream) => {
            match result {
                Ok((up, down)) => tracing::trace!(
                    "Forwarded connection to {}:{} closed ({} bytes up, {} bytes down)",
                    remote_host, remote_port, up, down
                ),
                Err(e) => tracing::debug!("Forwarded connection to {}:{} ended: {}", remote_host, remote_port, e),
            }
        }
    }
}
